//! Database query functions organized by domain.

pub mod aliases;
pub mod executions;
pub mod subscriptions;
