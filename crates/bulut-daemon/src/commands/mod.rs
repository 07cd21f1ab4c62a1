//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category.

pub mod alias;
pub mod diagnostics;
pub mod payments;
pub mod subscriptions;

use bulut_types::Address;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::RpcError;

type Result<T> = std::result::Result<T, RpcError>;

/// Required string parameter.
fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} required")))
}

fn address_param(params: &Value, name: &str) -> Result<Address> {
    str_param(params, name)?
        .parse()
        .map_err(|_| RpcError::invalid_params(&format!("{name} is not an address")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}
