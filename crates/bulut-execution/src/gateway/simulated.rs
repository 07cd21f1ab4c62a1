//! In-memory gateway with scriptable faults.
//!
//! Used by tests and by the daemon when no gateway credentials are
//! configured. Transfers are keyed by correlation id, so resubmitting the
//! same id returns the original transfer instead of paying twice.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bulut_crypto::blake3::{contexts, derive_id};

use super::{
    GatewayError, ReceiptStatus, TransferGateway, TransferReceipt, TransferRequest, TransferStatus,
};

/// Long enough to outlast any configured call timeout.
const HANG: Duration = Duration::from_secs(24 * 3600);

/// A scripted misbehaviour for the next submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Behave normally; lets a script target a later submission.
    Accept,
    /// Fail with a transient error; nothing is recorded.
    Transient(String),
    /// Fail with a permanent error; nothing is recorded.
    Permanent(String),
    /// Answer with a rejected receipt.
    Reject(String),
    /// Never answer; nothing is recorded.
    Hang,
    /// Record the transfer, then never answer.
    AcceptThenHang,
    /// Accept, but echo a different correlation id.
    WrongCorrelation,
}

struct SimTransfer {
    request: TransferRequest,
    outcome: TransferStatus,
    pending_polls: u32,
}

#[derive(Default)]
struct SimState {
    faults: VecDeque<Fault>,
    transfers: HashMap<String, SimTransfer>,
    by_correlation: HashMap<String, String>,
    accepted: Vec<String>,
    submit_calls: usize,
    settle_after: u32,
    settle_failures: u32,
    lookup_failures: u32,
}

/// Scriptable in-memory [`TransferGateway`].
#[derive(Default)]
pub struct SimulatedGateway {
    state: Mutex<SimState>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `polls` pending answers before each transfer settles.
    pub fn with_settle_after(self, polls: u32) -> Self {
        self.lock().settle_after = polls;
        self
    }

    /// Queue a fault for the next submission.
    pub fn push_fault(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// The next `n` accepted transfers settle as failed.
    pub fn fail_next_settlements(&self, n: u32) {
        self.lock().settle_failures = n;
    }

    /// The next `n` correlation lookups fail transiently.
    pub fn fail_next_lookups(&self, n: u32) {
        self.lock().lookup_failures = n;
    }

    /// Number of `submit_transfer` calls received.
    pub fn submit_calls(&self) -> usize {
        self.lock().submit_calls
    }

    /// Accepted transfers, in acceptance order.
    pub fn accepted(&self) -> Vec<TransferRequest> {
        let state = self.lock();
        state
            .accepted
            .iter()
            .filter_map(|r| state.transfers.get(r))
            .map(|t| t.request.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(state: &mut SimState, request: &TransferRequest) -> String {
        if let Some(existing) = state.by_correlation.get(&request.correlation_id) {
            return existing.clone();
        }
        let gateway_ref = derive_id(
            "sim_",
            contexts::GATEWAY_REF,
            request.correlation_id.as_bytes(),
            12,
        );
        let outcome = if state.settle_failures > 0 {
            state.settle_failures -= 1;
            TransferStatus::Failed
        } else {
            TransferStatus::Confirmed
        };
        state.transfers.insert(
            gateway_ref.clone(),
            SimTransfer {
                request: request.clone(),
                outcome,
                pending_polls: state.settle_after,
            },
        );
        state
            .by_correlation
            .insert(request.correlation_id.clone(), gateway_ref.clone());
        state.accepted.push(gateway_ref.clone());
        gateway_ref
    }
}

#[async_trait]
impl TransferGateway for SimulatedGateway {
    async fn submit_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, GatewayError> {
        let (fault, gateway_ref) = {
            let mut state = self.lock();
            state.submit_calls += 1;
            let fault = state.faults.pop_front();
            let gateway_ref = match fault {
                None
                | Some(Fault::Accept)
                | Some(Fault::AcceptThenHang)
                | Some(Fault::WrongCorrelation) => {
                    Some(Self::record(&mut state, request))
                }
                _ => None,
            };
            (fault, gateway_ref)
        };

        match fault {
            None | Some(Fault::Accept) => Ok(TransferReceipt {
                status: ReceiptStatus::Accepted,
                gateway_ref,
                correlation_id: request.correlation_id.clone(),
                reason: None,
            }),
            Some(Fault::Transient(msg)) => Err(GatewayError::Transient(msg)),
            Some(Fault::Permanent(msg)) => Err(GatewayError::Permanent(msg)),
            Some(Fault::Reject(reason)) => Ok(TransferReceipt {
                status: ReceiptStatus::Rejected,
                gateway_ref: None,
                correlation_id: request.correlation_id.clone(),
                reason: Some(reason),
            }),
            Some(Fault::Hang) | Some(Fault::AcceptThenHang) => {
                tokio::time::sleep(HANG).await;
                Err(GatewayError::Transient("simulated gateway hung".into()))
            }
            Some(Fault::WrongCorrelation) => Ok(TransferReceipt {
                status: ReceiptStatus::Accepted,
                gateway_ref,
                correlation_id: format!("{}-other", request.correlation_id),
                reason: None,
            }),
        }
    }

    async fn query_transfer(&self, gateway_ref: &str) -> Result<TransferStatus, GatewayError> {
        let mut state = self.lock();
        let transfer = state
            .transfers
            .get_mut(gateway_ref)
            .ok_or_else(|| GatewayError::Permanent(format!("unknown transfer {gateway_ref}")))?;
        if transfer.pending_polls > 0 {
            transfer.pending_polls -= 1;
            return Ok(TransferStatus::Pending);
        }
        Ok(transfer.outcome)
    }

    async fn lookup_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<(String, TransferStatus)>, GatewayError> {
        let mut state = self.lock();
        if state.lookup_failures > 0 {
            state.lookup_failures -= 1;
            return Err(GatewayError::Transient("lookup unavailable".into()));
        }
        let Some(gateway_ref) = state.by_correlation.get(correlation_id).cloned() else {
            return Ok(None);
        };
        let status = match state.transfers.get(&gateway_ref) {
            Some(t) if t.pending_polls > 0 => TransferStatus::Pending,
            Some(t) => t.outcome,
            None => TransferStatus::Pending,
        };
        Ok(Some((gateway_ref, status)))
    }
}
