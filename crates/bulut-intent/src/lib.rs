//! # bulut-intent
//!
//! Turns structured payment intent records into [`ValidatedIntent`]s.
//!
//! Validation is a pure function of the record, a [`RecipientResolver`] and
//! the current time. Handles are resolved exactly once, here, and the
//! resolved addresses travel with the intent from then on.
//!
//! Natural-language parsing sits in front of validation behind the
//! [`parser::IntentParser`] trait; a parser's output is never trusted
//! without passing through [`validate`].
//!
//! ## Modules
//!
//! - [`validator`]: Intent validation rules
//! - [`resolver`]: Recipient resolution capability
//! - [`parser`]: Pattern and LLM backed intent parsers
//!
//! [`ValidatedIntent`]: bulut_types::intent::ValidatedIntent

pub mod parser;
pub mod resolver;
pub mod validator;

pub use resolver::RecipientResolver;
pub use validator::{validate, validate_value};

use bulut_types::intent::IntentKind;
use bulut_types::Address;

/// Error types for intent validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The record is missing a field, has a wrong type, or is inconsistent.
    #[error("malformed intent: {0}")]
    MalformedIntent(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("invalid sender address: {0}")]
    InvalidSender(String),

    #[error("{kind:?} intent needs {expected} recipient(s), got {actual}")]
    RecipientCount {
        kind: IntentKind,
        expected: usize,
        actual: usize,
    },

    #[error("split intent has no recipients")]
    EmptyRecipients,

    #[error("invalid basis points: {0}")]
    InvalidBasisPoints(String),

    /// Split basis points do not add up to 10000.
    #[error("basis points sum to {total}, expected 10000")]
    BasisPointsSum { total: i128 },

    #[error("recipient listed twice: {0}")]
    DuplicateRecipient(Address),

    #[error("invalid recipient reference: {0}")]
    InvalidRecipient(String),

    /// A handle that the alias directory does not know.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("recipient resolution unavailable: {0}")]
    ResolverUnavailable(String),

    #[error("subscription intent has no frequency")]
    MissingFrequency,

    #[error("unknown frequency: {0}")]
    UnknownFrequency(String),

    #[error("start date {start_date} is too far in the past (now {now})")]
    StartDateInPast { start_date: u64, now: u64 },

    #[error("memo is {len} characters, limit is {max}")]
    MemoTooLong { len: usize, max: usize },
}

/// Convenience result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;
