//! # bulut-execution
//!
//! Drives validated intents to a terminal state through the transfer gateway.
//!
//! An [`Execution`] moves through
//! `Pending -> Submitted -> Confirmed | Failed`, may fail straight from
//! `Pending`, and may go back from `Failed` to `Pending` for a bounded
//! number of retry rounds. Every transition is appended to the audit
//! history before the caller sees the result.
//!
//! ## Modules
//!
//! - [`coordinator`]: Idempotent execution, fan-out, retry and reconciliation
//! - [`gateway`]: The `TransferGateway` boundary with simulated and HTTP backends
//! - [`ledger`]: Execution storage (in-memory and SQLite)
//! - [`split`]: Basis-point allocation of an amount across recipients
//! - [`retry`]: Retry budget, backoff and gateway call timeouts
//! - [`locks`]: Per-intent async locks
//! - [`fingerprint`]: Intent payload fingerprints
//! - [`clock`]: Time source
//!
//! [`Execution`]: bulut_types::execution::Execution

pub mod clock;
pub mod coordinator;
pub mod fingerprint;
pub mod gateway;
pub mod ledger;
pub mod locks;
pub mod retry;
pub mod split;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::Coordinator;
pub use gateway::{GatewayError, TransferGateway};
pub use ledger::{ExecutionStore, MemoryLedger, SqliteLedger};
pub use retry::RetryPolicy;

use bulut_types::execution::ExecutionStatus;

/// Error types for execution operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// An intent id was reused with a different payload.
    #[error("intent {intent_id} was already executed with a different payload")]
    ConsistencyViolation { intent_id: String },

    /// The intent kind is not executed directly.
    #[error("intent is not directly executable: {0}")]
    NotExecutable(String),

    #[error("illegal transition {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("execution not found: {0}")]
    NotFound(String),

    /// The amount could not be divided across recipients.
    #[error("split allocation failed: {0}")]
    Split(String),

    /// Ledger failure.
    #[error("ledger error: {0}")]
    Store(String),
}

impl From<bulut_db::DbError> for ExecutionError {
    fn from(e: bulut_db::DbError) -> Self {
        ExecutionError::Store(e.to_string())
    }
}

/// Convenience result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;
