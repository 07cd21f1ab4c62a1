//! The execution coordinator.
//!
//! [`Coordinator::execute`] is idempotent per intent id. Calls for the same
//! id are serialized on a per-id lock; the first creates the execution and
//! later ones either return the terminal result or resume the unfinished
//! execution where it stopped.
//!
//! Each retry round does, in order:
//!
//! 1. Reconcile legs left in doubt by a lost or timed-out submission.
//! 2. Submit legs that have not reached the gateway.
//! 3. Poll submitted legs for settlement, a bounded number of times.
//!
//! A leg is marked in doubt *before* its submission goes out, so an
//! interrupted driver can never forget that money may be moving.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bulut_crypto::blake3::random_id;
use bulut_types::execution::{
    Execution, ExecutionStatus, FailureKind, HistoryEntry, LegStatus, TransferLeg,
};
use bulut_types::intent::{IntentKind, ValidatedIntent};
use bulut_types::{Address, MAX_HISTORY_LIMIT};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::fingerprint::fingerprint;
use crate::gateway::{
    GatewayError, ReceiptStatus, TransferGateway, TransferRequest, TransferStatus,
};
use crate::ledger::{ExecutionStore, Transition};
use crate::locks::KeyedLocks;
use crate::retry::RetryPolicy;
use crate::split::allocate;
use crate::{ExecutionError, Result};

/// How a retry round ended.
#[derive(Debug)]
enum Round {
    Confirmed,
    /// Legs are accepted but not yet settled.
    InFlight,
    Transient(String),
    Permanent(String),
}

/// Drives validated intents through the gateway.
pub struct Coordinator {
    store: Arc<dyn ExecutionStore>,
    gateway: Arc<dyn TransferGateway>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    locks: KeyedLocks,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        gateway: Arc<dyn TransferGateway>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a validated intent, or return / resume its existing execution.
    ///
    /// # Errors
    ///
    /// - [`ExecutionError::ConsistencyViolation`] if the intent id was already
    ///   used with a different payload
    /// - [`ExecutionError::NotExecutable`] for subscription intents, which
    ///   are paid by the scheduler
    /// - [`ExecutionError::Store`] on ledger failure
    pub async fn execute(&self, intent: &ValidatedIntent) -> Result<Execution> {
        if intent.kind == IntentKind::Subscription {
            return Err(ExecutionError::NotExecutable(
                "subscription intents are paid by the scheduler".into(),
            ));
        }
        let fingerprint = fingerprint(intent)?;
        let _guard = self.locks.lock(&intent.id).await;

        let mut exec = match self.store.find_by_intent(&intent.id)? {
            Some(existing) if existing.fingerprint != fingerprint => {
                tracing::error!(
                    intent_id = %intent.id,
                    execution_id = %existing.id,
                    "intent id reused with a different payload"
                );
                return Err(ExecutionError::ConsistencyViolation {
                    intent_id: intent.id.clone(),
                });
            }
            Some(existing) if existing.is_terminal() => {
                tracing::debug!(execution_id = %existing.id, "execution already terminal");
                return Ok(existing);
            }
            Some(existing) => {
                tracing::info!(
                    execution_id = %existing.id,
                    status = %existing.status,
                    "resuming execution"
                );
                existing
            }
            None => self.create(intent, fingerprint)?,
        };

        self.drive(&mut exec).await?;
        Ok(exec)
    }

    /// Resume an unfinished execution by id.
    pub async fn resume(&self, execution_id: &str) -> Result<Execution> {
        let intent_id = self
            .store
            .get(execution_id)?
            .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?
            .intent_id;
        let _guard = self.locks.lock(&intent_id).await;

        // Re-read under the lock; another caller may have advanced it.
        let mut exec = self
            .store
            .get(execution_id)?
            .ok_or_else(|| ExecutionError::NotFound(execution_id.to_string()))?;
        if !exec.is_terminal() {
            self.drive(&mut exec).await?;
        }
        Ok(exec)
    }

    /// Resume every unfinished execution, e.g. after a restart.
    ///
    /// An execution that cannot be resumed is logged and skipped so the
    /// rest still make progress.
    pub async fn recover(&self) -> Result<Vec<Execution>> {
        let open = self.store.list_unfinished()?;
        if !open.is_empty() {
            tracing::info!(count = open.len(), "recovering unfinished executions");
        }
        let mut resumed = Vec::with_capacity(open.len());
        for exec in open {
            match self.resume(&exec.id).await {
                Ok(exec) => resumed.push(exec),
                Err(e) => {
                    tracing::warn!(execution_id = %exec.id, error = %e, "could not resume execution");
                }
            }
        }
        Ok(resumed)
    }

    /// Call [`Coordinator::recover`] every `interval` until `shutdown` fires.
    /// The first sweep runs immediately.
    pub async fn run_recovery(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = interval.as_secs(), "execution recovery started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.recover().await {
                        tracing::error!(error = %e, "execution recovery sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("execution recovery stopped");
                    return;
                }
            }
        }
    }

    pub fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        self.store.get(id)
    }

    pub fn find_by_intent(&self, intent_id: &str) -> Result<Option<Execution>> {
        self.store.find_by_intent(intent_id)
    }

    /// Executions involving `address`, newest first. `limit` is capped at
    /// [`MAX_HISTORY_LIMIT`].
    pub fn history(&self, address: &Address, limit: usize, offset: usize) -> Result<Vec<Execution>> {
        self.store
            .history_for(address, limit.min(MAX_HISTORY_LIMIT), offset)
    }

    pub fn audit_trail(&self, execution_id: &str) -> Result<Vec<HistoryEntry>> {
        self.store.audit_trail(execution_id)
    }

    pub fn count_by_status(&self) -> Result<Vec<(ExecutionStatus, u64)>> {
        self.store.count_by_status()
    }

    fn create(&self, intent: &ValidatedIntent, fingerprint: String) -> Result<Execution> {
        let parts = allocate(intent.amount, &intent.recipients)?;
        let legs = intent
            .recipients
            .iter()
            .zip(parts)
            .enumerate()
            .map(|(i, (r, amount))| TransferLeg::new(i as u32, r.address, amount))
            .collect();

        let now = self.clock.now();
        let exec = Execution {
            id: random_id("exe_"),
            intent_id: intent.id.clone(),
            origin: intent.origin.clone(),
            sender: intent.sender,
            currency: intent.currency,
            amount: intent.amount,
            status: ExecutionStatus::Pending,
            failure: None,
            legs,
            attempt_count: 1,
            external_tx_ref: None,
            fingerprint,
            memo: intent.memo.clone(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        };
        let initial = Transition {
            from: None,
            to: ExecutionStatus::Pending,
            at: now,
            detail: format!("created for intent {}", intent.id),
        };
        self.store.create(intent, &exec.fingerprint, &exec, &initial)?;
        tracing::info!(
            execution_id = %exec.id,
            intent_id = %intent.id,
            legs = exec.legs.len(),
            "execution created"
        );
        Ok(exec)
    }

    /// Run rounds until the execution is terminal or left in flight.
    ///
    /// Once the retry budget is spent, an execution with a leg whose outcome
    /// is unknown is not failed terminally. It gets one reconciliation round
    /// that submits nothing and, if the gateway still cannot answer, stays
    /// open so a later call resumes it under the same intent id.
    async fn drive(&self, exec: &mut Execution) -> Result<()> {
        let mut settle_only = false;
        loop {
            match exec.status {
                ExecutionStatus::Confirmed => return Ok(()),
                ExecutionStatus::Failed if exec.failure.is_some() => return Ok(()),
                ExecutionStatus::Failed if self.policy.allows_another(exec.attempt_count) => {
                    tokio::time::sleep(self.policy.backoff(exec.attempt_count)).await;
                    exec.attempt_count += 1;
                    let detail = format!("retry round {}", exec.attempt_count);
                    self.transition(exec, ExecutionStatus::Pending, detail)?;
                }
                ExecutionStatus::Failed => {
                    tokio::time::sleep(self.policy.confirm_interval).await;
                    settle_only = true;
                    let detail = "reconciling after retry budget".to_string();
                    self.transition(exec, ExecutionStatus::Pending, detail)?;
                }
                ExecutionStatus::Pending | ExecutionStatus::Submitted => {
                    match self.run_round(exec, settle_only).await? {
                        Round::Confirmed => {
                            self.confirm(exec)?;
                            return Ok(());
                        }
                        Round::InFlight => {
                            tracing::debug!(execution_id = %exec.id, "execution still in flight");
                            return Ok(());
                        }
                        Round::Permanent(reason) => {
                            self.fail(exec, Some(FailureKind::Permanent), reason)?;
                        }
                        Round::Transient(reason) => {
                            if self.policy.allows_another(exec.attempt_count) {
                                tracing::warn!(
                                    execution_id = %exec.id,
                                    attempt = exec.attempt_count,
                                    reason = %reason,
                                    "transient failure, will retry"
                                );
                                self.fail(exec, None, reason)?;
                            } else if exec.has_unsettled_legs() {
                                self.fail(exec, None, format!("awaiting reconciliation: {reason}"))?;
                                if settle_only {
                                    tracing::warn!(
                                        execution_id = %exec.id,
                                        reason = %reason,
                                        "retry budget spent with transfers unresolved, execution left open"
                                    );
                                    return Ok(());
                                }
                            } else {
                                self.fail(
                                    exec,
                                    Some(FailureKind::Exhausted),
                                    format!("retry budget exhausted: {reason}"),
                                )?;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn run_round(&self, exec: &mut Execution, settle_only: bool) -> Result<Round> {
        if let Some(round) = self.reconcile(exec).await? {
            return Ok(round);
        }
        if !settle_only {
            if let Some(round) = self.submit_pending_legs(exec).await? {
                return Ok(round);
            }
        }
        self.poll(exec).await
    }

    /// Resolve in-doubt legs. Returns a round outcome if the round must stop.
    async fn reconcile(&self, exec: &mut Execution) -> Result<Option<Round>> {
        let mut unresolved = None;
        for i in 0..exec.legs.len() {
            if exec.legs[i].status != LegStatus::InDoubt {
                continue;
            }
            let Some(correlation_id) = exec.legs[i].correlation_id.clone() else {
                exec.legs[i].status = LegStatus::Unsubmitted;
                continue;
            };
            match self.call(self.gateway.lookup_correlation(&correlation_id)).await {
                Ok(Some((gateway_ref, status))) => {
                    let leg = &mut exec.legs[i];
                    leg.gateway_ref = Some(gateway_ref);
                    leg.status = match status {
                        TransferStatus::Pending => LegStatus::Submitted,
                        TransferStatus::Confirmed => LegStatus::Confirmed,
                        TransferStatus::Failed => LegStatus::Failed,
                    };
                    tracing::info!(
                        execution_id = %exec.id,
                        leg = i,
                        correlation_id = %correlation_id,
                        status = leg.status.as_str(),
                        "in-doubt leg found at gateway"
                    );
                }
                Ok(None) => {
                    exec.legs[i].status = LegStatus::Unsubmitted;
                    tracing::info!(
                        execution_id = %exec.id,
                        leg = i,
                        correlation_id = %correlation_id,
                        "in-doubt leg never reached gateway"
                    );
                }
                Err(e) => {
                    exec.legs[i].last_error = Some(e.to_string());
                    unresolved.get_or_insert(format!("leg {i} still in doubt: {e}"));
                }
            }
        }
        self.save(exec)?;

        if let Some(reason) = unresolved {
            return Ok(Some(Round::Transient(reason)));
        }
        // Reconciliation alone may have shown legs were accepted.
        self.mark_submitted(exec, "reconciled with gateway")?;
        Ok(None)
    }

    /// Hand unsubmitted legs to the gateway. Returns a round outcome if the
    /// round must stop.
    async fn submit_pending_legs(&self, exec: &mut Execution) -> Result<Option<Round>> {
        for i in 0..exec.legs.len() {
            if !matches!(exec.legs[i].status, LegStatus::Unsubmitted | LegStatus::Failed) {
                continue;
            }

            let leg = &mut exec.legs[i];
            leg.submissions += 1;
            let correlation_id = format!("{}/{}/{}", exec.id, leg.index, leg.submissions);
            leg.correlation_id = Some(correlation_id.clone());
            leg.status = LegStatus::InDoubt;
            let request = TransferRequest {
                sender: exec.sender,
                recipient: leg.recipient,
                amount: leg.amount,
                currency: exec.currency,
                correlation_id: correlation_id.clone(),
                memo: exec.memo.clone(),
            };
            self.save(exec)?;

            let outcome = self.call(self.gateway.submit_transfer(&request)).await;
            let leg = &mut exec.legs[i];
            match outcome {
                Ok(receipt) if receipt.correlation_id != correlation_id => {
                    leg.status = LegStatus::Failed;
                    let reason = format!(
                        "gateway echoed correlation id {} for {correlation_id}",
                        receipt.correlation_id
                    );
                    leg.last_error = Some(reason.clone());
                    self.save(exec)?;
                    return Ok(Some(Round::Permanent(reason)));
                }
                Ok(receipt) if receipt.status == ReceiptStatus::Rejected => {
                    leg.status = LegStatus::Failed;
                    let reason = format!(
                        "transfer rejected: {}",
                        receipt.reason.as_deref().unwrap_or("no reason given")
                    );
                    leg.last_error = Some(reason.clone());
                    self.save(exec)?;
                    return Ok(Some(Round::Permanent(reason)));
                }
                Ok(receipt) => {
                    leg.status = LegStatus::Submitted;
                    leg.gateway_ref = receipt.gateway_ref;
                    leg.last_error = None;
                    self.save(exec)?;
                    self.mark_submitted(exec, &format!("leg {i} accepted"))?;
                }
                Err(GatewayError::Permanent(msg)) => {
                    leg.status = LegStatus::Failed;
                    leg.last_error = Some(msg.clone());
                    self.save(exec)?;
                    return Ok(Some(Round::Permanent(msg)));
                }
                Err(GatewayError::Transient(msg)) => {
                    // The transfer may or may not exist; the leg stays in
                    // doubt until reconciled.
                    leg.last_error = Some(msg.clone());
                    self.save(exec)?;
                    return Ok(Some(Round::Transient(msg)));
                }
            }
        }
        Ok(None)
    }

    /// Poll submitted legs for settlement.
    async fn poll(&self, exec: &mut Execution) -> Result<Round> {
        for attempt in 0..self.policy.confirm_polls {
            if attempt > 0 {
                tokio::time::sleep(self.policy.confirm_interval).await;
            }
            let mut permanent = None;
            for leg in exec.legs.iter_mut().filter(|l| l.status == LegStatus::Submitted) {
                let Some(gateway_ref) = leg.gateway_ref.clone() else {
                    leg.status = LegStatus::InDoubt;
                    continue;
                };
                match self.call(self.gateway.query_transfer(&gateway_ref)).await {
                    Ok(TransferStatus::Confirmed) => leg.status = LegStatus::Confirmed,
                    Ok(TransferStatus::Failed) => {
                        leg.status = LegStatus::Failed;
                        leg.last_error = Some("settlement failed".into());
                    }
                    Ok(TransferStatus::Pending) => {}
                    Err(GatewayError::Transient(msg)) => leg.last_error = Some(msg),
                    Err(GatewayError::Permanent(msg)) => {
                        leg.status = LegStatus::Failed;
                        leg.last_error = Some(msg.clone());
                        permanent.get_or_insert(msg);
                    }
                }
            }
            self.save(exec)?;

            if let Some(msg) = permanent {
                return Ok(Round::Permanent(msg));
            }
            if !exec.legs.iter().any(|l| l.status == LegStatus::Submitted) {
                break;
            }
        }

        if exec.all_legs_confirmed() {
            return Ok(Round::Confirmed);
        }
        if let Some(leg) = exec.legs.iter().find(|l| l.status == LegStatus::Failed) {
            return Ok(Round::Transient(format!("leg {} failed to settle", leg.index)));
        }
        if exec.legs.iter().any(|l| l.status == LegStatus::InDoubt) {
            return Ok(Round::Transient("leg lost its gateway reference".into()));
        }
        if let Some(leg) = exec.legs.iter().find(|l| l.status == LegStatus::Unsubmitted) {
            return Ok(Round::Transient(format!("leg {} was never submitted", leg.index)));
        }
        Ok(Round::InFlight)
    }

    /// Wrap a gateway call in the configured deadline.
    async fn call<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, GatewayError>>,
    ) -> std::result::Result<T, GatewayError> {
        match tokio::time::timeout(self.policy.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Transient(format!(
                "gateway call timed out after {:?}",
                self.policy.call_timeout
            ))),
        }
    }

    fn mark_submitted(&self, exec: &mut Execution, detail: &str) -> Result<()> {
        let any_accepted = exec
            .legs
            .iter()
            .any(|l| matches!(l.status, LegStatus::Submitted | LegStatus::Confirmed));
        if exec.status == ExecutionStatus::Pending && any_accepted {
            self.transition(exec, ExecutionStatus::Submitted, detail.to_string())?;
        }
        Ok(())
    }

    fn confirm(&self, exec: &mut Execution) -> Result<()> {
        if exec.status == ExecutionStatus::Pending {
            self.transition(exec, ExecutionStatus::Submitted, "legs already settled".into())?;
        }
        let refs: Vec<&str> = exec
            .legs
            .iter()
            .filter_map(|l| l.gateway_ref.as_deref())
            .collect();
        exec.external_tx_ref = Some(refs.join(","));
        exec.confirmed_at = Some(self.clock.now());
        self.transition(exec, ExecutionStatus::Confirmed, "all legs confirmed".into())?;
        tracing::info!(
            execution_id = %exec.id,
            intent_id = %exec.intent_id,
            attempts = exec.attempt_count,
            "execution confirmed"
        );
        Ok(())
    }

    fn fail(&self, exec: &mut Execution, failure: Option<FailureKind>, reason: String) -> Result<()> {
        exec.failure = failure;
        self.transition(exec, ExecutionStatus::Failed, reason.clone())?;
        if let Some(kind) = failure {
            tracing::warn!(
                execution_id = %exec.id,
                intent_id = %exec.intent_id,
                failure = kind.as_str(),
                attempts = exec.attempt_count,
                reason = %reason,
                "execution failed"
            );
        }
        Ok(())
    }

    fn transition(&self, exec: &mut Execution, to: ExecutionStatus, detail: String) -> Result<()> {
        let from = exec.status;
        if !from.can_transition_to(to) {
            return Err(ExecutionError::InvalidTransition { from, to });
        }
        let at = self.clock.now();
        exec.status = to;
        exec.updated_at = at;
        let t = Transition {
            from: Some(from),
            to,
            at,
            detail,
        };
        self.store.save(exec, Some(&t))
    }

    fn save(&self, exec: &mut Execution) -> Result<()> {
        exec.updated_at = self.clock.now();
        self.store.save(exec, None)
    }
}
