//! Subscription creation and lifecycle.
//!
//! ```text
//! Active <-> Paused
//!    \        /
//!    Cancelled (terminal)
//! ```

use std::sync::Arc;

use bulut_crypto::blake3::{contexts, derive_id};
use bulut_types::intent::{IntentKind, ValidatedIntent};
use bulut_types::subscription::{Subscription, SubscriptionStatus};
use bulut_types::Address;

use crate::store::SubscriptionStore;
use crate::{Result, SubscriptionError};

/// Subscription id derived from the intent that created it.
pub fn subscription_id(intent_id: &str) -> String {
    derive_id("sub_", contexts::SUBSCRIPTION_ID, intent_id.as_bytes(), 8)
}

/// Creates subscriptions and applies subscriber-initiated status changes.
#[derive(Clone)]
pub struct SubscriptionBook {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionBook {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Record a validated subscription intent.
    ///
    /// Creating twice from the same intent returns the existing subscription.
    ///
    /// # Errors
    ///
    /// - [`SubscriptionError::InvalidIntent`] if the intent is not a
    ///   single-recipient subscription with a schedule
    pub fn create(&self, intent: &ValidatedIntent) -> Result<Subscription> {
        if intent.kind != IntentKind::Subscription {
            return Err(SubscriptionError::InvalidIntent(format!(
                "intent {} is a {} payment",
                intent.id,
                intent.kind.as_str()
            )));
        }
        let schedule = intent.schedule.ok_or_else(|| {
            SubscriptionError::InvalidIntent(format!("intent {} has no schedule", intent.id))
        })?;
        let [recipient] = intent.recipients.as_slice() else {
            return Err(SubscriptionError::InvalidIntent(format!(
                "subscription needs exactly one recipient, got {}",
                intent.recipients.len()
            )));
        };

        let sub = Subscription {
            id: subscription_id(&intent.id),
            subscriber: intent.sender,
            recipient: recipient.address,
            amount: intent.amount,
            currency: intent.currency,
            frequency: schedule.frequency,
            start_date: schedule.start_date,
            status: SubscriptionStatus::Active,
            last_payment_date: None,
            failed_attempts: 0,
            memo: intent.memo.clone(),
            created_at: intent.created_at,
        };

        if !self.store.insert(&sub)? {
            tracing::debug!(subscription_id = %sub.id, "subscription already exists");
            return self
                .store
                .get(&sub.id)?
                .ok_or(SubscriptionError::NotFound(sub.id));
        }
        tracing::info!(
            subscription_id = %sub.id,
            subscriber = %sub.subscriber,
            frequency = %sub.frequency,
            start_date = sub.start_date,
            "subscription created"
        );
        Ok(sub)
    }

    pub fn get(&self, id: &str) -> Result<Option<Subscription>> {
        self.store.get(id)
    }

    /// Subscriptions owned by `subscriber`, oldest first.
    pub fn list(&self, subscriber: &Address, active_only: bool) -> Result<Vec<Subscription>> {
        self.store.list_by_subscriber(subscriber, active_only)
    }

    /// Active subscriptions due at `now`.
    pub fn due(&self, now: u64) -> Result<Vec<Subscription>> {
        Ok(self
            .store
            .list_active()?
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect())
    }

    pub fn pause(&self, id: &str, actor: &Address) -> Result<Subscription> {
        self.change(id, actor, "pause", |from| {
            (from == SubscriptionStatus::Active).then_some(SubscriptionStatus::Paused)
        })
    }

    pub fn resume(&self, id: &str, actor: &Address) -> Result<Subscription> {
        self.change(id, actor, "resume", |from| {
            (from == SubscriptionStatus::Paused).then_some(SubscriptionStatus::Active)
        })
    }

    pub fn cancel(&self, id: &str, actor: &Address) -> Result<Subscription> {
        self.change(id, actor, "cancel", |from| {
            (from != SubscriptionStatus::Cancelled).then_some(SubscriptionStatus::Cancelled)
        })
    }

    pub(crate) fn record_payment(&self, id: &str, confirmed_at: u64) -> Result<()> {
        self.store.record_payment(id, confirmed_at)
    }

    pub(crate) fn record_failure(&self, id: &str) -> Result<()> {
        self.store.record_failure(id)
    }

    fn change(
        &self,
        id: &str,
        actor: &Address,
        action: &'static str,
        next: impl FnOnce(SubscriptionStatus) -> Option<SubscriptionStatus>,
    ) -> Result<Subscription> {
        let mut sub = self
            .store
            .get(id)?
            .ok_or_else(|| SubscriptionError::NotFound(id.to_string()))?;
        if sub.subscriber != *actor {
            tracing::warn!(subscription_id = %id, actor = %actor, action, "rejected: not the subscriber");
            return Err(SubscriptionError::NotSubscriber(id.to_string()));
        }
        let to = next(sub.status).ok_or_else(|| SubscriptionError::InvalidTransition {
            id: id.to_string(),
            from: sub.status,
            action,
        })?;
        if !self.store.swap_status(id, sub.status, to)? {
            // Another change landed between the read and the write.
            let current = self
                .store
                .get(id)?
                .ok_or_else(|| SubscriptionError::NotFound(id.to_string()))?;
            tracing::warn!(
                subscription_id = %id,
                action,
                expected = sub.status.as_str(),
                found = current.status.as_str(),
                "subscription changed concurrently"
            );
            return Err(SubscriptionError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                action,
            });
        }
        tracing::info!(subscription_id = %id, from = sub.status.as_str(), to = to.as_str(), "subscription status changed");
        sub.status = to;
        Ok(sub)
    }
}
