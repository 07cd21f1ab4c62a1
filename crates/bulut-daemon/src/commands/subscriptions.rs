//! Subscription command handlers.
//!
//! Mutations name an `actor`; only the subscriber may change a
//! subscription.

use std::sync::Arc;

use bulut_types::subscription::Subscription;
use serde_json::Value;

use super::{address_param, str_param, to_json, Result};
use crate::DaemonState;

/// Subscriptions owned by a subscriber.
pub async fn list_subscriptions(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let subscriber = address_param(params, "subscriber")?;
    let active_only = params
        .get("active_only")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    to_json(&state.subscriptions.list(&subscriber, active_only)?)
}

pub async fn pause_subscription(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let id = str_param(params, "subscription_id")?;
    let actor = address_param(params, "actor")?;
    let sub = state.subscriptions.pause(id, &actor)?;
    changed(state, "SubscriptionPaused", &sub)
}

pub async fn resume_subscription(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let id = str_param(params, "subscription_id")?;
    let actor = address_param(params, "actor")?;
    let sub = state.subscriptions.resume(id, &actor)?;
    changed(state, "SubscriptionResumed", &sub)
}

pub async fn cancel_subscription(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let id = str_param(params, "subscription_id")?;
    let actor = address_param(params, "actor")?;
    let sub = state.subscriptions.cancel(id, &actor)?;
    changed(state, "SubscriptionCancelled", &sub)
}

fn changed(state: &DaemonState, event_type: &str, sub: &Subscription) -> Result<Value> {
    state.emit(
        event_type,
        serde_json::json!({"subscription_id": sub.id, "status": sub.status}),
    );
    to_json(sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::alias::register_alias;
    use crate::commands::payments::execute_payment;
    use crate::commands::test_support::{registration, state};
    use bulut_crypto::secp256k1::LocalSigner;
    use bulut_types::Address;

    const SUBSCRIBER: Address = Address([1; 20]);

    async fn subscribed() -> (Arc<DaemonState>, String, Value) {
        let state = state();
        let netflix = registration(&LocalSigner::generate(), "@netflix");
        register_alias(&state, &netflix).await.expect("register");
        let result = execute_payment(
            &state,
            &serde_json::json!({
                "intent": {
                    "id": "int_netflix",
                    "type": "subscription",
                    "amount": "9.99",
                    "currency": "USD",
                    "sender": SUBSCRIBER.to_string(),
                    "recipients": [{"handle": "@netflix"}],
                    "frequency": "monthly",
                }
            }),
        )
        .await
        .expect("subscribe");
        let id = result["subscription"]["id"]
            .as_str()
            .expect("id")
            .to_string();
        (state, id, netflix["address"].clone())
    }

    fn change(id: &str, actor: &Value) -> Value {
        serde_json::json!({"subscription_id": id, "actor": actor})
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (state, id, _) = subscribed().await;
        let me = serde_json::json!(SUBSCRIBER.to_string());

        let paused = pause_subscription(&state, &change(&id, &me)).await.expect("pause");
        assert_eq!(paused["status"], "paused");

        let active = list_subscriptions(
            &state,
            &serde_json::json!({"subscriber": me, "active_only": true}),
        )
        .await
        .expect("list");
        assert!(active.as_array().expect("array").is_empty());

        let resumed = resume_subscription(&state, &change(&id, &me)).await.expect("resume");
        assert_eq!(resumed["status"], "active");

        let cancelled = cancel_subscription(&state, &change(&id, &me)).await.expect("cancel");
        assert_eq!(cancelled["status"], "cancelled");

        let err = resume_subscription(&state, &change(&id, &me))
            .await
            .expect_err("terminal");
        assert_eq!(err.message, "INVALID_TRANSITION");

        let all = list_subscriptions(&state, &serde_json::json!({"subscriber": me}))
            .await
            .expect("list");
        assert_eq!(all.as_array().expect("array").len(), 1);
    }

    #[tokio::test]
    async fn test_only_subscriber_may_cancel() {
        let (state, id, netflix) = subscribed().await;
        let err = cancel_subscription(&state, &change(&id, &netflix))
            .await
            .expect_err("not subscriber");
        assert_eq!(err.message, "NOT_SUBSCRIBER");
    }

    #[tokio::test]
    async fn test_unknown_subscription() {
        let state = state();
        let me = serde_json::json!(SUBSCRIBER.to_string());
        let err = pause_subscription(&state, &change("sub_missing", &me))
            .await
            .expect_err("missing");
        assert_eq!(err.message, "SUBSCRIPTION_NOT_FOUND");
    }
}
