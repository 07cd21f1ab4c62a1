//! Natural-language intent parsers.
//!
//! Parsers turn a free-text command into a candidate intent record. The
//! record still has to pass [`crate::validate`]; parsers only propose.
//!
//! Two interchangeable backends exist, selected by configuration:
//! [`PatternParser`] (offline keyword matching) and [`LlmParser`]
//! (OpenAI-compatible chat completion API).

pub mod llm;
pub mod pattern;

pub use llm::LlmParser;
pub use pattern::PatternParser;

use async_trait::async_trait;
use bulut_types::intent::IntentKind;
use serde::{Deserialize, Serialize};

/// Input to a parser.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParseRequest {
    pub text: String,
    /// Address of the user issuing the command; becomes the intent sender.
    pub sender: String,
    /// Id to stamp on the produced intent.
    pub intent_id: String,
}

/// A parser's proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub kind: IntentKind,
    /// Parser certainty in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Human-readable summary to show before executing.
    pub confirmation_text: String,
    /// Intent record in the shape accepted by [`crate::validate_value`].
    pub intent: serde_json::Value,
    /// Which backend produced this command.
    pub parser: String,
}

/// Error types for parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// The command lacks information needed to build an intent.
    #[error("{code}: {message}")]
    Incomplete { code: String, message: String },

    /// The backend could not be reached or answered nonsense.
    #[error("parser backend error: {0}")]
    Backend(String),
}

impl ParserError {
    pub fn incomplete(code: &str, message: &str) -> Self {
        ParserError::Incomplete {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// A natural-language intent parser backend.
#[async_trait]
pub trait IntentParser: Send + Sync {
    /// Backend name, reported in [`ParsedCommand::parser`].
    fn name(&self) -> &'static str;

    async fn parse(&self, request: &ParseRequest) -> Result<ParsedCommand, ParserError>;
}

/// Format an amount for confirmation prompts.
pub(crate) fn display_amount(amount: &str, currency: &str) -> String {
    match currency {
        "USD" => format!("${amount}"),
        _ => format!("{amount} {currency}"),
    }
}
