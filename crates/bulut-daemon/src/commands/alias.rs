//! Alias directory command handlers.

use std::sync::Arc;

use bulut_types::Handle;
use serde_json::Value;

use super::{address_param, str_param, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Bind a handle to the signing address.
pub async fn register_alias(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let handle = str_param(params, "handle")?;
    let address = str_param(params, "address")?;
    let signature = str_param(params, "signature")?;

    let alias = state
        .aliases
        .register(handle, address, signature, state.clock.now())?;
    state.emit(
        "AliasRegistered",
        serde_json::json!({"handle": alias.handle.to_string(), "address": alias.address.to_string()}),
    );
    to_json(&alias)
}

/// Resolve a handle to an address.
pub async fn resolve_alias(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let handle: Handle = str_param(params, "handle")?
        .parse()
        .map_err(|_| RpcError::invalid_params("handle is not a valid @handle"))?;
    let address = state
        .aliases
        .resolve_and_touch(handle.as_str(), state.clock.now())?;
    let registered_at = state.aliases.lookup(handle.as_str())?.registered_at;
    Ok(serde_json::json!({
        "handle": handle.to_string(),
        "address": address.to_string(),
        "registered_at": registered_at,
    }))
}

/// Resolve an address to its handle.
pub async fn reverse_resolve(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let address = address_param(params, "address")?;
    let handle = state.aliases.reverse_resolve(&address.to_string())?;
    Ok(serde_json::json!({
        "address": address.to_string(),
        "handle": handle.to_string(),
    }))
}

/// Remove a binding, proven by the bound address.
pub async fn release_alias(state: &Arc<DaemonState>, params: &Value) -> Result<Value> {
    let handle = str_param(params, "handle")?;
    let signature = str_param(params, "signature")?;
    let alias = state.aliases.release(handle, signature)?;
    state.emit(
        "AliasReleased",
        serde_json::json!({"handle": alias.handle.to_string()}),
    );
    Ok(serde_json::json!({"released": true, "handle": alias.handle.to_string()}))
}
