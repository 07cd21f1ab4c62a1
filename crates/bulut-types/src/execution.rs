//! Executions, their per-recipient transfer legs, and the audit history.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::intent::IntentOrigin;
use crate::{Address, Amount, Currency, Result, TypesError};

/// Execution state.
///
/// `Pending -> Submitted -> Confirmed | Failed`, `Pending -> Failed`, and
/// `Failed -> Pending` for a bounded retry round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ExecutionStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Failed)
                | (Submitted, Confirmed)
                | (Submitted, Failed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "submitted" => Ok(Self::Submitted),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// Why a failed execution is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FailureKind {
    /// The gateway rejected a transfer outright.
    Permanent,
    /// Transient failures outlasted the retry budget.
    Exhausted,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::Exhausted => "exhausted",
        }
    }
}

impl FromStr for FailureKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "permanent" => Ok(Self::Permanent),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// Per-recipient transfer status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum LegStatus {
    /// Not yet handed to the gateway, or known not to have reached it.
    Unsubmitted,
    /// A submission was attempted but its outcome was never observed.
    InDoubt,
    /// Accepted by the gateway, awaiting settlement.
    Submitted,
    Confirmed,
    Failed,
}

impl LegStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsubmitted => "unsubmitted",
            Self::InDoubt => "in_doubt",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for LegStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unsubmitted" => Ok(Self::Unsubmitted),
            "in_doubt" => Ok(Self::InDoubt),
            "submitted" => Ok(Self::Submitted),
            "confirmed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// One recipient transfer within an execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub index: u32,
    pub recipient: Address,
    pub amount: Amount,
    pub status: LegStatus,
    /// Correlation id of the most recent submission.
    pub correlation_id: Option<String>,
    pub gateway_ref: Option<String>,
    /// Number of submissions attempted for this leg.
    pub submissions: u32,
    pub last_error: Option<String>,
}

impl TransferLeg {
    pub fn new(index: u32, recipient: Address, amount: Amount) -> Self {
        Self {
            index,
            recipient,
            amount,
            status: LegStatus::Unsubmitted,
            correlation_id: None,
            gateway_ref: None,
            submissions: 0,
            last_error: None,
        }
    }
}

/// The tracked attempt to realize one intent as external transfers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub intent_id: String,
    pub origin: IntentOrigin,
    pub sender: Address,
    pub currency: Currency,
    pub amount: Amount,
    pub status: ExecutionStatus,
    pub failure: Option<FailureKind>,
    pub legs: Vec<TransferLeg>,
    /// Retry rounds started, counting the first.
    pub attempt_count: u32,
    pub external_tx_ref: Option<String>,
    /// Hex fingerprint of the intent payload.
    pub fingerprint: String,
    pub memo: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub confirmed_at: Option<u64>,
}

impl Execution {
    /// Confirmed, or failed with a recorded terminal cause.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            ExecutionStatus::Confirmed => true,
            ExecutionStatus::Failed => self.failure.is_some(),
            _ => false,
        }
    }

    pub fn is_failed_terminal(&self) -> bool {
        self.status == ExecutionStatus::Failed && self.failure.is_some()
    }

    /// Whether `address` is the sender or a leg recipient.
    pub fn involves(&self, address: &Address) -> bool {
        self.sender == *address || self.legs.iter().any(|l| l.recipient == *address)
    }

    /// Whether any leg may have moved money without a known outcome.
    pub fn has_unsettled_legs(&self) -> bool {
        self.legs
            .iter()
            .any(|l| matches!(l.status, LegStatus::InDoubt | LegStatus::Submitted))
    }

    pub fn all_legs_confirmed(&self) -> bool {
        !self.legs.is_empty() && self.legs.iter().all(|l| l.status == LegStatus::Confirmed)
    }
}

/// An append-only audit record of one state transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub execution_id: String,
    pub seq: u32,
    pub from_state: Option<ExecutionStatus>,
    pub to_state: ExecutionStatus,
    pub timestamp: u64,
    pub detail: String,
}
