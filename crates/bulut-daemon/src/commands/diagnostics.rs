//! Diagnostics command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::Result;
use crate::events::EventFilter;
use crate::rpc::RpcError;
use crate::DaemonState;

/// Liveness and a summary of execution states.
pub async fn health(state: &Arc<DaemonState>) -> Result<Value> {
    let executions: serde_json::Map<String, Value> = state
        .coordinator
        .count_by_status()?
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), Value::from(count)))
        .collect();

    Ok(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.clock.now().saturating_sub(state.started_at),
        "gateway": state.gateway_mode,
        "parser": state.parser.name(),
        "scheduler_enabled": state.config.scheduler.enabled,
        "executions": executions,
        "events_emitted": state.event_bus.sequence(),
    }))
}

/// Acknowledge an event subscription. The connection handler starts
/// streaming `event` notifications once this succeeds.
pub async fn subscribe_events(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let filter = EventFilter::from_params(params).map_err(|e| RpcError::invalid_params(&e))?;
    Ok(serde_json::json!({
        "subscribed": true,
        "categories": filter.categories(),
        "sequence": state.event_bus.sequence(),
    }))
}
