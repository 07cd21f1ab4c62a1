//! Recurring payment subscriptions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Currency, Result, TypesError, SECS_PER_DAY};

/// Billing cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Fixed interval between payments. Months are 30 days, years 365.
    pub fn interval_secs(self) -> u64 {
        match self {
            Self::Daily => SECS_PER_DAY,
            Self::Weekly => 7 * SECS_PER_DAY,
            Self::Monthly => 30 * SECS_PER_DAY,
            Self::Yearly => 365 * SECS_PER_DAY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" | "annually" => Ok(Self::Yearly),
            _ => Err(TypesError::UnknownFrequency(s.to_string())),
        }
    }
}

/// Subscription lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// A recurring payment from one subscriber to one recipient.
///
/// Subscriptions are never deleted; cancellation is a terminal status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub subscriber: Address,
    pub recipient: Address,
    pub amount: Amount,
    pub currency: Currency,
    pub frequency: Frequency,
    pub start_date: u64,
    pub status: SubscriptionStatus,
    pub last_payment_date: Option<u64>,
    /// Terminal execution failures since the last successful payment.
    pub failed_attempts: u32,
    pub memo: Option<String>,
    pub created_at: u64,
}

impl Subscription {
    /// The instant the next payment falls due.
    pub fn next_due_at(&self) -> u64 {
        match self.last_payment_date {
            None => self.start_date,
            Some(last) => last.saturating_add(self.frequency.interval_secs()),
        }
    }

    /// Whether an active subscription is due at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        self.status == SubscriptionStatus::Active && now >= self.next_due_at()
    }
}
