//! Intent parsing, payment execution and history handlers.

use std::sync::Arc;

use bulut_crypto::blake3::random_id;
use bulut_intent::parser::ParseRequest;
use bulut_types::execution::{Execution, ExecutionStatus};
use bulut_types::intent::IntentKind;
use serde_json::Value;

use super::{address_param, str_param, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

const DEFAULT_HISTORY_LIMIT: u64 = 20;

/// Turn a free-text command into a proposed intent record.
pub async fn parse_command(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let text = str_param(params, "text")?;
    let sender = address_param(params, "sender")?;
    let intent_id = params
        .get("intent_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| random_id("int_"));

    let request = ParseRequest {
        text: text.to_string(),
        sender: sender.to_string(),
        intent_id,
    };
    let command = state.parser.parse(&request).await?;
    to_json(&command)
}

/// Validate an intent record and carry it out.
///
/// Single and split intents are executed; subscription intents create a
/// subscription that the scheduler pays from then on.
pub async fn execute_payment(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let record = params
        .get("intent")
        .cloned()
        .ok_or_else(|| RpcError::invalid_params("intent required"))?;
    let intent = bulut_intent::validate_value(record, &state.aliases, state.clock.now())?;

    if intent.kind == IntentKind::Subscription {
        let sub = state.subscriptions.create(&intent)?;
        state.emit(
            "SubscriptionCreated",
            serde_json::json!({"subscription_id": sub.id, "frequency": sub.frequency}),
        );
        return Ok(serde_json::json!({
            "kind": intent.kind,
            "subscription": to_json(&sub)?,
        }));
    }

    let exec = state.coordinator.execute(&intent).await?;
    emit_outcome(state, &exec);
    Ok(serde_json::json!({
        "kind": intent.kind,
        "execution": to_json(&exec)?,
    }))
}

fn emit_outcome(state: &DaemonState, exec: &Execution) {
    let event_type = match exec.status {
        ExecutionStatus::Confirmed => "PaymentConfirmed",
        _ if exec.is_failed_terminal() => "PaymentFailed",
        _ => "PaymentPending",
    };
    state.emit(
        event_type,
        serde_json::json!({
            "execution_id": exec.id,
            "intent_id": exec.intent_id,
            "status": exec.status,
        }),
    );
}

/// Look up an execution by execution id or intent id.
pub async fn get_execution(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let found = if let Some(id) = params.get("execution_id").and_then(|v| v.as_str()) {
        state.coordinator.get_execution(id)?
    } else if let Some(id) = params.get("intent_id").and_then(|v| v.as_str()) {
        state.coordinator.find_by_intent(id)?
    } else {
        return Err(RpcError::invalid_params("execution_id or intent_id required"));
    };
    match found {
        Some(exec) => to_json(&exec),
        None => Err(RpcError::execution_not_found("no matching execution")),
    }
}

/// Executions involving an address, newest first.
pub async fn get_history(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let address = address_param(params, "address")?;
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let offset = params.get("offset").and_then(|v| v.as_u64()).unwrap_or(0);

    let executions = state
        .coordinator
        .history(&address, limit as usize, offset as usize)?;
    to_json(&executions)
}

/// State transitions of one execution, oldest first.
pub async fn get_audit_trail(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let id = str_param(params, "execution_id")?;
    if state.coordinator.get_execution(id)?.is_none() {
        return Err(RpcError::execution_not_found(id));
    }
    to_json(&state.coordinator.audit_trail(id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::alias::register_alias;
    use crate::commands::test_support::{registration, state};
    use bulut_crypto::secp256k1::LocalSigner;
    use bulut_types::Address;

    const SENDER: Address = Address([1; 20]);

    async fn with_alice() -> (Arc<DaemonState>, Value) {
        let state = state();
        let params = registration(&LocalSigner::generate(), "@alice");
        register_alias(&state, &params).await.expect("register");
        (state, params["address"].clone())
    }

    fn single(id: &str, amount: &str) -> Value {
        serde_json::json!({
            "intent": {
                "id": id,
                "type": "single",
                "amount": amount,
                "currency": "USD",
                "sender": SENDER.to_string(),
                "recipients": [{"handle": "@alice"}],
            }
        })
    }

    #[tokio::test]
    async fn test_parse_then_execute() {
        let (state, alice) = with_alice().await;

        let parsed = parse_command(
            &state,
            &serde_json::json!({
                "text": "send $50 to @alice for lunch",
                "sender": SENDER.to_string(),
                "intent_id": "int_lunch",
            }),
        )
        .await
        .expect("parse");
        assert_eq!(parsed["kind"], "single");
        assert_eq!(parsed["parser"], "pattern");

        let result = execute_payment(&state, &serde_json::json!({"intent": parsed["intent"]}))
            .await
            .expect("execute");
        let exec = &result["execution"];
        assert_eq!(exec["status"], "confirmed");
        assert_eq!(exec["intent_id"], "int_lunch");
        assert_eq!(exec["legs"][0]["recipient"], alice);
    }

    #[tokio::test]
    async fn test_execute_is_idempotent() {
        let (state, _) = with_alice().await;
        let first = execute_payment(&state, &single("int_1", "50.00"))
            .await
            .expect("first");
        let second = execute_payment(&state, &single("int_1", "50.00"))
            .await
            .expect("second");
        assert_eq!(first["execution"]["id"], second["execution"]["id"]);

        let err = execute_payment(&state, &single("int_1", "51.00"))
            .await
            .expect_err("reused id");
        assert_eq!(err.message, "CONSISTENCY_VIOLATION");
    }

    #[tokio::test]
    async fn test_unknown_recipient() {
        let state = state();
        let err = execute_payment(&state, &single("int_1", "5"))
            .await
            .expect_err("unknown");
        assert_eq!(err.message, "UNKNOWN_RECIPIENT");
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let (state, _) = with_alice().await;
        let err = execute_payment(&state, &single("int_1", "-5"))
            .await
            .expect_err("invalid");
        assert_eq!(err.message, "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn test_subscription_intent_creates_subscription() {
        let (state, _) = with_alice().await;
        let params = serde_json::json!({
            "intent": {
                "id": "int_sub",
                "type": "subscription",
                "amount": "9.99",
                "currency": "USD",
                "sender": SENDER.to_string(),
                "recipients": [{"handle": "@alice"}],
                "frequency": "monthly",
            }
        });
        let result = execute_payment(&state, &params).await.expect("create");
        assert_eq!(result["kind"], "subscription");
        assert_eq!(result["subscription"]["status"], "active");
        assert!(result.get("execution").is_none());
    }

    #[tokio::test]
    async fn test_history_and_audit_trail() {
        let (state, alice) = with_alice().await;
        let result = execute_payment(&state, &single("int_1", "50.00"))
            .await
            .expect("execute");
        let exec_id = result["execution"]["id"].as_str().expect("id").to_string();

        let history = get_history(&state, &serde_json::json!({"address": alice}))
            .await
            .expect("history");
        assert_eq!(history.as_array().expect("array").len(), 1);

        let trail = get_audit_trail(&state, &serde_json::json!({"execution_id": exec_id}))
            .await
            .expect("trail");
        let states: Vec<&str> = trail
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|h| h["to_state"].as_str())
            .collect();
        assert_eq!(states, vec!["pending", "submitted", "confirmed"]);

        let by_intent = get_execution(&state, &serde_json::json!({"intent_id": "int_1"}))
            .await
            .expect("by intent");
        assert_eq!(by_intent["id"], exec_id.as_str());

        let err = get_audit_trail(&state, &serde_json::json!({"execution_id": "exe_none"}))
            .await
            .expect_err("missing");
        assert_eq!(err.code, -32031);
    }
}
