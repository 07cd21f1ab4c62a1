//! # bulut-types
//!
//! Shared domain types used across the Bulut workspace: addresses and
//! handles, money, payment intents, subscriptions, executions and their
//! audit history.

pub mod address;
pub mod execution;
pub mod intent;
pub mod money;
pub mod subscription;

pub use address::{Address, Alias, Handle};
pub use money::{Amount, Currency};

/// Basis points representing 100% of an amount.
pub const BASIS_POINTS_TOTAL: u32 = 10_000;

/// How far in the past a subscription start date may lie (1 hour).
pub const START_DATE_GRACE_SECS: u64 = 3600;

/// Maximum memo length in characters.
pub const MAX_MEMO_CHARS: usize = 200;

/// Maximum page size for history queries.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Seconds per day.
pub const SECS_PER_DAY: u64 = 86_400;

/// Errors raised while parsing domain values from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("unknown frequency: {0}")]
    UnknownFrequency(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, TypesError>;

#[cfg(test)]
mod tests {
    #[test]
    #[ignore] // Run manually to generate bindings
    fn export_ts_bindings() {
        use ts_rs::TS;
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bindings");
        std::fs::create_dir_all(&dir).expect("create bindings dir");
        crate::money::Currency::export_all_to(&dir).expect("export");
        crate::intent::IntentKind::export_all_to(&dir).expect("export");
        crate::subscription::Frequency::export_all_to(&dir).expect("export");
        crate::subscription::SubscriptionStatus::export_all_to(&dir).expect("export");
        crate::execution::ExecutionStatus::export_all_to(&dir).expect("export");
        crate::execution::LegStatus::export_all_to(&dir).expect("export");
        crate::execution::FailureKind::export_all_to(&dir).expect("export");
    }
}
