//! Offline keyword parser.
//!
//! Recognises commands such as:
//!
//! - `Send $50 to @alice for lunch`
//! - `Split $120 between @bob and @carol`
//! - `Pay @bob 60% and @carol 40% of 100 EUR`
//! - `Pay @netflix $9.99 every month`

use async_trait::async_trait;
use bulut_types::intent::{IntentKind, RawIntent, RawRecipient};
use bulut_types::subscription::Frequency;
use bulut_types::{Currency, MAX_MEMO_CHARS};

use super::{display_amount, IntentParser, ParseRequest, ParsedCommand, ParserError};

/// Keyword-matching parser that needs no network access.
#[derive(Debug, Default, Clone)]
pub struct PatternParser;

impl PatternParser {
    pub fn new() -> Self {
        Self
    }
}

const SINGLE_CONFIDENCE: f64 = 0.85;
const SUBSCRIPTION_CONFIDENCE: f64 = 0.80;
const SPLIT_CONFIDENCE: f64 = 0.78;

#[derive(Debug, Default)]
struct Scan {
    amount: Option<String>,
    currency: Option<Currency>,
    handles: Vec<String>,
    basis_points: Vec<i64>,
    frequency: Option<Frequency>,
    memo: Option<String>,
    split_keyword: bool,
    subscription_keyword: bool,
}

fn strip_punct(word: &str) -> &str {
    word.trim_matches(|c: char| matches!(c, ',' | '!' | '?' | ';' | ':' | '(' | ')' | '"' | '\''))
        .trim_end_matches('.')
}

fn currency_word(word: &str) -> Option<Currency> {
    match word {
        "usd" | "dollar" | "dollars" | "bucks" => Some(Currency::Usd),
        "eur" | "euro" | "euros" => Some(Currency::Eur),
        "gbp" | "pound" | "pounds" => Some(Currency::Gbp),
        "usdc" => Some(Currency::Usdc),
        "arc" => Some(Currency::Arc),
        "eth" | "ether" => Some(Currency::Eth),
        "btc" | "bitcoin" => Some(Currency::Btc),
        _ => None,
    }
}

fn is_decimal(text: &str) -> bool {
    let mut parts = text.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

/// `$50`, `€20.5`, `£3`, or a bare number; returns the number and any
/// currency implied by the symbol.
fn amount_token(word: &str) -> Option<(String, Option<Currency>)> {
    let (symbol, rest) = match word.chars().next()? {
        '$' => (Some(Currency::Usd), &word[1..]),
        '€' => (Some(Currency::Eur), &word['€'.len_utf8()..]),
        '£' => (Some(Currency::Gbp), &word['£'.len_utf8()..]),
        _ => (None, word),
    };
    is_decimal(rest).then(|| (rest.to_string(), symbol))
}

/// `60%` or `33.33%` as basis points.
fn percent_token(word: &str) -> Option<i64> {
    let number = word.strip_suffix('%')?;
    if !is_decimal(number) {
        return None;
    }
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if frac.len() > 2 {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<2}").parse().ok()?
    };
    whole.checked_mul(100)?.checked_add(frac)
}

fn frequency_word(word: &str, next: Option<&str>) -> Option<Frequency> {
    match (word, next) {
        ("daily", _) | ("every", Some("day")) => Some(Frequency::Daily),
        ("weekly", _) | ("every", Some("week")) => Some(Frequency::Weekly),
        ("monthly", _) | ("every", Some("month")) => Some(Frequency::Monthly),
        ("yearly" | "annually", _) | ("every", Some("year")) => Some(Frequency::Yearly),
        _ => None,
    }
}

fn is_memo_terminator(word: &str) -> bool {
    matches!(
        word,
        "every" | "daily" | "weekly" | "monthly" | "yearly" | "annually" | "starting"
    )
}

fn scan(text: &str) -> Scan {
    let words: Vec<&str> = text.split_whitespace().collect();
    let lower: Vec<String> = words.iter().map(|w| strip_punct(w).to_lowercase()).collect();
    let mut scan = Scan::default();

    let mut i = 0;
    while i < words.len() {
        let word = strip_punct(words[i]);
        let lw = lower[i].as_str();
        let next = lower.get(i + 1).map(String::as_str);

        if let Some(handle) = word.strip_prefix('@') {
            if !handle.is_empty() {
                scan.handles.push(format!("@{handle}"));
            }
        } else if let Some(bp) = percent_token(lw) {
            scan.basis_points.push(bp);
        } else if scan.amount.is_none() && amount_token(lw).is_some() {
            if let Some((amount, symbol)) = amount_token(lw) {
                scan.amount = Some(amount);
                scan.currency = symbol.or_else(|| next.and_then(currency_word));
            }
        } else if let Some(freq) = frequency_word(lw, next) {
            scan.frequency.get_or_insert(freq);
        } else if matches!(lw, "split" | "divide" | "evenly") {
            scan.split_keyword = true;
        } else if matches!(lw, "subscribe" | "subscription" | "recurring") {
            scan.subscription_keyword = true;
        } else if lw == "for" && scan.memo.is_none() {
            let memo: Vec<&str> = words[i + 1..]
                .iter()
                .zip(&lower[i + 1..])
                .take_while(|(_, l)| !is_memo_terminator(l))
                .map(|(w, _)| *w)
                .collect();
            let memo = memo.join(" ");
            let memo = memo.trim_end_matches(['.', '!', '?']).trim();
            if !memo.is_empty() {
                scan.memo = Some(memo.chars().take(MAX_MEMO_CHARS).collect());
            }
        } else if let Some(currency) = currency_word(lw) {
            scan.currency.get_or_insert(currency);
        }
        i += 1;
    }
    scan
}

fn build(request: &ParseRequest, scan: Scan) -> Result<ParsedCommand, ParserError> {
    let amount = scan.amount.ok_or_else(|| {
        ParserError::incomplete("missing_amount", "Try: 'Send [amount] to [recipient]'")
    })?;
    if scan.handles.is_empty() {
        return Err(ParserError::incomplete(
            "missing_recipient",
            "Try: 'Send [amount] to @alias'",
        ));
    }
    let currency = scan.currency.unwrap_or(Currency::Usd);
    let shown = display_amount(&amount, currency.code());

    let kind = if scan.split_keyword || scan.handles.len() > 1 {
        IntentKind::Split
    } else if scan.frequency.is_some() || scan.subscription_keyword {
        IntentKind::Subscription
    } else {
        IntentKind::Single
    };

    let explicit = kind == IntentKind::Split && scan.basis_points.len() == scan.handles.len();
    let recipients: Vec<RawRecipient> = scan
        .handles
        .iter()
        .enumerate()
        .map(|(i, h)| RawRecipient::handle(h, explicit.then(|| scan.basis_points[i])))
        .collect();

    let (confidence, confirmation_text, frequency) = match kind {
        IntentKind::Single => (
            SINGLE_CONFIDENCE,
            format!("Send {shown} to {}?", scan.handles[0]),
            None,
        ),
        IntentKind::Subscription => {
            let frequency = scan.frequency.unwrap_or(Frequency::Monthly);
            (
                SUBSCRIPTION_CONFIDENCE,
                format!("Set up {frequency} {shown} to {}?", scan.handles[0]),
                Some(frequency.as_str().to_string()),
            )
        }
        IntentKind::Split => (
            SPLIT_CONFIDENCE,
            format!("Split {shown} between {} people?", scan.handles.len()),
            None,
        ),
    };

    let intent = RawIntent {
        id: request.intent_id.clone(),
        kind,
        amount,
        currency: currency.code().to_string(),
        sender: request.sender.clone(),
        recipients,
        memo: scan.memo,
        frequency,
        start_date: None,
        created_at: None,
    };

    Ok(ParsedCommand {
        kind,
        confidence,
        confirmation_text,
        intent: serde_json::to_value(&intent).map_err(|e| ParserError::Backend(e.to_string()))?,
        parser: "pattern".to_string(),
    })
}

#[async_trait]
impl IntentParser for PatternParser {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn parse(&self, request: &ParseRequest) -> Result<ParsedCommand, ParserError> {
        let result = build(request, scan(&request.text));
        if let Err(e) = &result {
            tracing::debug!(text = %request.text, error = %e, "pattern parser gave up");
        }
        result
    }
}
