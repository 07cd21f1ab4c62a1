//! Periodic processing of due subscriptions.

use std::sync::Arc;
use std::time::Duration;

use bulut_execution::{Clock, Coordinator};
use bulut_types::execution::{Execution, ExecutionStatus};
use bulut_types::intent::{IntentKind, IntentOrigin, ResolvedRecipient, ValidatedIntent};
use bulut_types::subscription::Subscription;
use bulut_types::BASIS_POINTS_TOTAL;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::book::SubscriptionBook;
use crate::Result;

/// Outcome counts for one tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub due: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub in_flight: usize,
    /// Payments that could not be driven at all (store or consistency errors).
    pub errors: usize,
}

/// Turns due subscriptions into payments.
pub struct Scheduler {
    book: SubscriptionBook,
    coordinator: Arc<Coordinator>,
    clock: Arc<dyn Clock>,
}

/// Intent id for one payment of `sub`.
///
/// Stable while a payment is in flight, and fresh after a terminal failure
/// because the failure count is part of it.
pub fn payment_intent_id(sub: &Subscription) -> String {
    format!("{}_{}_{}", sub.id, sub.next_due_at(), sub.failed_attempts)
}

fn payment_intent(sub: &Subscription, now: u64) -> ValidatedIntent {
    ValidatedIntent {
        id: payment_intent_id(sub),
        kind: IntentKind::Single,
        amount: sub.amount,
        currency: sub.currency,
        sender: sub.subscriber,
        recipients: vec![ResolvedRecipient {
            address: sub.recipient,
            handle: None,
            basis_points: BASIS_POINTS_TOTAL,
        }],
        memo: sub.memo.clone(),
        schedule: None,
        origin: IntentOrigin::Subscription {
            subscription_id: sub.id.clone(),
        },
        created_at: now,
    }
}

impl Scheduler {
    pub fn new(book: SubscriptionBook, coordinator: Arc<Coordinator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            book,
            coordinator,
            clock,
        }
    }

    pub fn book(&self) -> &SubscriptionBook {
        &self.book
    }

    /// Pay every subscription due at `now`, one payment each.
    pub async fn tick(&self, now: u64) -> Result<TickReport> {
        let due = self.book.due(now)?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for sub in due {
            let intent = payment_intent(&sub, now);
            match self.coordinator.execute(&intent).await {
                Ok(exec) => self.settle(&sub, &exec, &mut report)?,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(
                        subscription_id = %sub.id,
                        intent_id = %intent.id,
                        error = %e,
                        "subscription payment could not be executed"
                    );
                }
            }
        }

        if report.due > 0 {
            tracing::info!(
                due = report.due,
                confirmed = report.confirmed,
                failed = report.failed,
                in_flight = report.in_flight,
                errors = report.errors,
                "scheduler tick"
            );
        }
        Ok(report)
    }

    fn settle(&self, sub: &Subscription, exec: &Execution, report: &mut TickReport) -> Result<()> {
        match exec.status {
            ExecutionStatus::Confirmed => {
                let at = exec.confirmed_at.unwrap_or(exec.updated_at);
                self.book.record_payment(&sub.id, at)?;
                report.confirmed += 1;
                tracing::info!(subscription_id = %sub.id, execution_id = %exec.id, "subscription paid");
            }
            _ if exec.is_failed_terminal() => {
                self.book.record_failure(&sub.id)?;
                report.failed += 1;
                tracing::warn!(
                    subscription_id = %sub.id,
                    execution_id = %exec.id,
                    failed_attempts = sub.failed_attempts + 1,
                    "subscription payment failed"
                );
            }
            _ => report.in_flight += 1,
        }
        Ok(())
    }

    /// Tick every `interval` until `shutdown` fires.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = interval.as_secs(), "subscription scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(self.clock.now()).await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("subscription scheduler stopped");
                    return;
                }
            }
        }
    }
}
