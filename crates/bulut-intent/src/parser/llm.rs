//! Parser backed by an OpenAI-compatible chat completion API.
//!
//! The model is asked for a JSON object describing the intent. The reply is
//! treated as untrusted input: it is reshaped into a [`RawIntent`] with the
//! caller's sender and intent id, and handles the model invents are
//! penalised in the reported confidence.

use async_trait::async_trait;
use bulut_types::intent::{IntentKind, RawIntent, RawRecipient};
use bulut_types::{Handle, MAX_MEMO_CHARS};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{display_amount, IntentParser, ParseRequest, ParsedCommand, ParserError};

pub const DEFAULT_API_URL: &str = "https://api.aimlapi.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Confidence penalty for each recipient handle that is not well formed.
const INVALID_HANDLE_PENALTY: f64 = 0.2;
const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_CONFIRMATION: &str = "Confirm payment?";

const SYSTEM_PROMPT: &str = r#"You convert payment commands into JSON.

Recipients are alias handles starting with '@'. Supported currencies: USD (default), EUR, GBP, USDC, ARC, ETH, BTC.
Payment types:
- single: one recipient
- split: several recipients; give basis_points (parts of 10000) only when the command states shares
- subscription: one recipient with frequency daily, weekly, monthly or yearly

The memo is the text after "for", at most 200 characters.

Respond with JSON only, no prose.

Example: "Send $50 to @alice for lunch"
{"type": "single", "amount": "50", "currency": "USD", "recipients": [{"handle": "@alice"}], "memo": "lunch", "confidence": 0.95, "confirmation_text": "Send $50 to @alice?"}

Example: "Pay @bob 60% and @carol 40% of 100 EUR"
{"type": "split", "amount": "100", "currency": "EUR", "recipients": [{"handle": "@bob", "basis_points": 6000}, {"handle": "@carol", "basis_points": 4000}], "confidence": 0.9, "confirmation_text": "Split 100 EUR between 2 people?"}

Example: "Pay @netflix $9.99 every month"
{"type": "subscription", "amount": "9.99", "currency": "USD", "recipients": [{"handle": "@netflix"}], "frequency": "monthly", "confidence": 0.9, "confirmation_text": "Set up monthly $9.99 to @netflix?"}

If the amount or recipient is missing:
{"error": {"code": "missing_info", "message": "Try: 'Send [amount] to @alias'"}}"#;

/// LLM-backed intent parser.
pub struct LlmParser {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl LlmParser {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
        }
    }

    /// Create a parser from environment variables.
    ///
    /// Required: BULUT_LLM_API_KEY
    /// Optional: BULUT_LLM_API_URL, BULUT_LLM_MODEL
    pub fn from_env() -> Result<Self, ParserError> {
        let api_key = std::env::var("BULUT_LLM_API_KEY")
            .map_err(|_| ParserError::Backend("BULUT_LLM_API_KEY not set".into()))?;
        let api_url =
            std::env::var("BULUT_LLM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let model = std::env::var("BULUT_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Ok(Self::new(api_key, api_url, model))
    }

    async fn complete(&self, user: &str) -> Result<String, ParserError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object".into(),
            },
            messages: vec![
                Message {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                Message {
                    role: "user".into(),
                    content: user.into(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ParserError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ParserError::Backend(format!("API error: {error_text}")));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| ParserError::Backend(e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ParserError::Backend("empty response".into()))
    }
}

impl std::fmt::Debug for LlmParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmParser")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IntentParser for LlmParser {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn parse(&self, request: &ParseRequest) -> Result<ParsedCommand, ParserError> {
        let reply = self.complete(&request.text).await?;
        tracing::debug!(model = %self.model, "llm reply received");
        interpret_reply(&reply, request)
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelReply {
    #[serde(rename = "type", alias = "kind")]
    kind: Option<IntentKind>,
    amount: Option<serde_json::Value>,
    currency: Option<String>,
    recipients: Vec<RawRecipient>,
    memo: Option<String>,
    frequency: Option<String>,
    #[serde(alias = "startDate")]
    start_date: Option<u64>,
    confidence: Option<f64>,
    #[serde(alias = "confirmationText")]
    confirmation_text: Option<String>,
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Extract the outermost JSON object from a model reply that may be wrapped
/// in prose or code fences.
fn extract_json(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

fn amount_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().trim_start_matches('$').to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn a model reply into a [`ParsedCommand`].
pub(crate) fn interpret_reply(
    reply: &str,
    request: &ParseRequest,
) -> Result<ParsedCommand, ParserError> {
    let json = extract_json(reply)
        .ok_or_else(|| ParserError::Backend("no JSON object in model reply".into()))?;
    let reply: ModelReply = serde_json::from_str(json)
        .map_err(|e| ParserError::Backend(format!("unreadable model reply: {e}")))?;

    if let Some(err) = reply.error {
        return Err(ParserError::Incomplete {
            code: err.code,
            message: err.message,
        });
    }

    let amount = reply
        .amount
        .as_ref()
        .and_then(amount_text)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ParserError::incomplete("missing_amount", "model reply has no amount"))?;
    if reply.recipients.is_empty() {
        return Err(ParserError::incomplete(
            "missing_recipient",
            "model reply has no recipients",
        ));
    }

    let kind = reply.kind.unwrap_or(if reply.recipients.len() > 1 {
        IntentKind::Split
    } else if reply.frequency.is_some() {
        IntentKind::Subscription
    } else {
        IntentKind::Single
    });

    let invalid_handles = reply
        .recipients
        .iter()
        .filter_map(|r| r.handle.as_deref())
        .filter(|h| h.parse::<Handle>().is_err())
        .count();
    let confidence = (reply.confidence.unwrap_or(DEFAULT_CONFIDENCE)
        - INVALID_HANDLE_PENALTY * invalid_handles as f64)
        .clamp(0.0, 1.0);

    let currency = reply
        .currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "USD".to_string());
    let confirmation_text = reply
        .confirmation_text
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIRMATION.to_string());
    let memo = reply
        .memo
        .map(|m| m.trim().chars().take(MAX_MEMO_CHARS).collect::<String>())
        .filter(|m| !m.is_empty());

    let intent = RawIntent {
        id: request.intent_id.clone(),
        kind,
        amount,
        currency,
        sender: request.sender.clone(),
        recipients: reply.recipients,
        memo,
        frequency: reply.frequency,
        start_date: reply.start_date,
        created_at: None,
    };
    tracing::debug!(
        kind = kind.as_str(),
        shown = %display_amount(&intent.amount, &intent.currency),
        confidence,
        "llm command interpreted"
    );

    Ok(ParsedCommand {
        kind,
        confidence,
        confirmation_text,
        intent: serde_json::to_value(&intent).map_err(|e| ParserError::Backend(e.to_string()))?,
        parser: "llm".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ParseRequest {
        ParseRequest {
            text: "irrelevant".into(),
            sender: "0x0101010101010101010101010101010101010101".into(),
            intent_id: "int_llm".into(),
        }
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_interpret_single() {
        let reply = r#"Here you go: {"type": "single", "amount": 50, "currency": "usd",
            "recipients": [{"handle": "@alice"}], "memo": "lunch",
            "confidence": 0.95, "confirmation_text": "Send $50 to @alice?"}"#;
        let cmd = interpret_reply(reply, &request()).expect("interpret");
        assert_eq!(cmd.kind, IntentKind::Single);
        assert_eq!(cmd.parser, "llm");
        assert!((cmd.confidence - 0.95).abs() < 1e-9);
        assert_eq!(cmd.intent["amount"], "50");
        assert_eq!(cmd.intent["currency"], "USD");
        assert_eq!(cmd.intent["id"], "int_llm");
        assert_eq!(cmd.intent["sender"], request().sender);
    }

    #[test]
    fn test_invalid_handle_lowers_confidence() {
        let reply = r#"{"type": "split", "amount": "10", "recipients":
            [{"handle": "@bob"}, {"handle": "carol smith"}], "confidence": 0.9}"#;
        let cmd = interpret_reply(reply, &request()).expect("interpret");
        assert!((cmd.confidence - 0.7).abs() < 1e-9);
        assert_eq!(cmd.confirmation_text, DEFAULT_CONFIRMATION);
    }

    #[test]
    fn test_error_reply_is_incomplete() {
        let reply = r#"{"error": {"code": "missing_info", "message": "Try again"}}"#;
        assert!(matches!(
            interpret_reply(reply, &request()),
            Err(ParserError::Incomplete { code, message })
                if code == "missing_info" && message == "Try again"
        ));
    }

    #[test]
    fn test_missing_fields() {
        assert!(matches!(
            interpret_reply(r#"{"recipients": [{"handle": "@a1c"}]}"#, &request()),
            Err(ParserError::Incomplete { code, .. }) if code == "missing_amount"
        ));
        assert!(matches!(
            interpret_reply(r#"{"amount": "5"}"#, &request()),
            Err(ParserError::Incomplete { code, .. }) if code == "missing_recipient"
        ));
        assert!(matches!(
            interpret_reply("garbage", &request()),
            Err(ParserError::Backend(_))
        ));
    }

    #[test]
    fn test_kind_inferred_from_frequency() {
        let reply = r#"{"amount": "9.99", "recipients": [{"handle": "@netflix"}],
            "frequency": "monthly"}"#;
        let cmd = interpret_reply(reply, &request()).expect("interpret");
        assert_eq!(cmd.kind, IntentKind::Subscription);
        assert_eq!(cmd.intent["frequency"], "monthly");
    }
}
