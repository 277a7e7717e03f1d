//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Handlers
//! parse their params, run a closure on the ledger actor and render the
//! result as JSON.

pub mod admin;
pub mod journal;
pub mod members;
pub mod modules;
pub mod revenue;
pub mod withdrawals;

use std::sync::Arc;

use dataunion_types::{Address, Amount, Weight};
use serde_json::Value;

use crate::actor::{with_backoff, Backoff, Runtime};
use crate::rpc::RpcError;
use crate::DaemonState;

pub type Result = std::result::Result<Value, RpcError>;

/// Run a ledger operation on the actor, retrying while it is busy.
pub(crate) async fn ledger_call<F, R>(state: &Arc<DaemonState>, f: F) -> std::result::Result<R, RpcError>
where
    F: FnOnce(&mut Runtime) -> dataunion_ledger::Result<R> + Clone + Send + 'static,
    R: Send + 'static,
{
    let outcome = with_backoff(Backoff::default(), || state.ledger.call(f.clone())).await?;
    Ok(outcome?)
}

/// Like [`ledger_call`] for infallible reads.
pub(crate) async fn ledger_read<F, R>(state: &Arc<DaemonState>, f: F) -> std::result::Result<R, RpcError>
where
    F: FnOnce(&mut Runtime) -> R + Clone + Send + 'static,
    R: Send + 'static,
{
    Ok(with_backoff(Backoff::default(), || state.ledger.call(f.clone())).await?)
}

fn parse_address_value(key: &str, value: &Value) -> std::result::Result<Address, RpcError> {
    value
        .as_str()
        .and_then(|s| s.parse::<Address>().ok())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be a hex address")))
}

pub(crate) fn address(params: &Value, key: &str) -> std::result::Result<Address, RpcError> {
    let value = params
        .get(key)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    parse_address_value(key, value)
}

pub(crate) fn optional_address(params: &Value, key: &str) -> std::result::Result<Option<Address>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_address_value(key, value).map(Some),
    }
}

pub(crate) fn amount(params: &Value, key: &str) -> std::result::Result<Amount, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

pub(crate) fn optional_amount(params: &Value, key: &str) -> std::result::Result<Option<Amount>, RpcError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be an unsigned integer"))),
    }
}

pub(crate) fn address_list(params: &Value, key: &str) -> std::result::Result<Vec<Address>, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be an array")))?
        .iter()
        .map(|v| parse_address_value(key, v))
        .collect()
}

/// `[{"member": "..", "weight": n}, ..]`
pub(crate) fn weighted_list(params: &Value, key: &str) -> std::result::Result<Vec<(Address, Weight)>, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} must be an array")))?
        .iter()
        .map(|entry| Ok((address(entry, "member")?, amount(entry, "weight")?)))
        .collect()
}

pub(crate) fn signature(params: &Value, key: &str) -> std::result::Result<Vec<u8>, RpcError> {
    let encoded = params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))?;
    hex::decode(encoded).map_err(|_| RpcError::invalid_params(&format!("{key} must be hex")))
}
