//! # bulut-scheduler
//!
//! Recurring payments. A [`SubscriptionBook`] holds the subscriptions; the
//! [`Scheduler`] turns due subscriptions into single-recipient intents and
//! hands them to the execution coordinator.
//!
//! Payment intent ids are derived from the subscription id, the due instant
//! and the failure count, so a payment interrupted mid-flight is resumed on
//! the next tick instead of being paid again.
//!
//! ## Modules
//!
//! - [`store`]: Subscription storage (in-memory and SQLite)
//! - [`book`]: Creation and lifecycle of subscriptions
//! - [`scheduler`]: Periodic due-payment processing

pub mod book;
pub mod scheduler;
pub mod store;

pub use book::SubscriptionBook;
pub use scheduler::{Scheduler, TickReport};
pub use store::{MemorySubscriptionStore, SqliteSubscriptionStore, SubscriptionStore};

use bulut_types::subscription::SubscriptionStatus;

/// Error types for subscription operations.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("subscription not found: {0}")]
    NotFound(String),

    /// The caller is not the subscriber.
    #[error("only the subscriber may change subscription {0}")]
    NotSubscriber(String),

    #[error("cannot {action} subscription {id} while {from:?}")]
    InvalidTransition {
        id: String,
        from: SubscriptionStatus,
        action: &'static str,
    },

    /// The intent cannot become a subscription.
    #[error("invalid subscription intent: {0}")]
    InvalidIntent(String),

    #[error("subscription store error: {0}")]
    Store(String),
}

impl From<bulut_db::DbError> for SubscriptionError {
    fn from(e: bulut_db::DbError) -> Self {
        match e {
            bulut_db::DbError::NotFound(what) => SubscriptionError::NotFound(what),
            other => SubscriptionError::Store(other.to_string()),
        }
    }
}

/// Convenience result type for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
