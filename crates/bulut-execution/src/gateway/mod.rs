//! The transfer gateway boundary.
//!
//! A gateway moves funds for one recipient per call. Every submission
//! carries a caller-chosen correlation id, which the gateway echoes back
//! and which can later be used to find a submission whose reply was lost.

pub mod http;
pub mod simulated;

pub use http::{HttpGateway, HttpGatewayConfig};
pub use simulated::{Fault, SimulatedGateway};

use async_trait::async_trait;
use bulut_types::{Address, Amount, Currency};
use serde::{Deserialize, Serialize};

/// One transfer handed to the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sender: Address,
    pub recipient: Address,
    pub amount: Amount,
    pub currency: Currency,
    pub correlation_id: String,
    pub memo: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Accepted,
    Rejected,
}

/// The gateway's answer to a submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub status: ReceiptStatus,
    pub gateway_ref: Option<String>,
    pub correlation_id: String,
    /// Rejection reason, when rejected.
    pub reason: Option<String>,
}

/// Settlement state of an accepted transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Gateway failures, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Timeouts, 5xx, rate limiting, transport errors.
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// Invalid address, insufficient sponsor balance, rejected signature,
    /// any other definitive refusal.
    #[error("permanent gateway error: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// External transfer execution service.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    /// Submit one transfer.
    async fn submit_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, GatewayError>;

    /// Settlement state of an accepted transfer.
    async fn query_transfer(&self, gateway_ref: &str) -> Result<TransferStatus, GatewayError>;

    /// Find an earlier submission by correlation id.
    ///
    /// `Ok(None)` means the gateway never accepted a transfer under this id.
    async fn lookup_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<(String, TransferStatus)>, GatewayError>;
}
