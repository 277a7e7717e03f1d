//! Built-in module handlers: bans, configured weights, rate limits,
//! withdraw routes, and the module lock.

use std::sync::Arc;

use dataunion_ledger::modules::rate_limit::RateLimits;
use serde_json::Value;

use super::{address, amount, ledger_call, ledger_read, optional_address, optional_amount, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

fn disabled(module: &str) -> RpcError {
    RpcError::invalid_state(&format!("{module} module is not enabled"))
}

/// Ban a member, permanently or for `seconds`.
pub async fn ban_member(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    let seconds = optional_amount(params, "seconds")?;
    let until = ledger_read(state, move |rt| {
        let ban = rt.ban.clone()?;
        let result = match seconds {
            Some(seconds) => ban.ban_seconds(&mut rt.ledger, &caller, &member, seconds),
            None => ban.ban(&mut rt.ledger, &caller, &member),
        };
        Some(result.map(|()| ban.banned_until(&member)))
    })
    .await?
    .ok_or_else(|| disabled("ban"))??;
    Ok(serde_json::json!({"member": member, "banned_until": until}))
}

pub async fn restore_member(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    ledger_read(state, move |rt| {
        let ban = rt.ban.clone()?;
        Some(ban.restore(&mut rt.ledger, &caller, &member))
    })
    .await?
    .ok_or_else(|| disabled("ban"))??;
    Ok(serde_json::json!({"restored": member}))
}

pub async fn get_ban(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = address(params, "member")?;
    let (banned, until) = ledger_read(state, move |rt| {
        let ban = rt.ban.clone()?;
        Some((ban.is_banned(&rt.ledger, &member), ban.banned_until(&member)))
    })
    .await?
    .ok_or_else(|| disabled("ban"))?;
    Ok(serde_json::json!({"member": member, "banned": banned, "banned_until": until}))
}

/// Configure a member's weight in the weight module.
pub async fn set_weight(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    let weight = amount(params, "weight")?;
    ledger_read(state, move |rt| {
        let weights = rt.weights.clone()?;
        Some(weights.set_weight(&mut rt.ledger, &caller, &member, weight))
    })
    .await?
    .ok_or_else(|| disabled("weight"))??;
    Ok(serde_json::json!({"member": member, "weight": weight}))
}

/// Current limits, plus `member`'s usage of the current period if given.
pub async fn get_rate_limits(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = optional_address(params, "member")?;
    let (limits, used) = ledger_read(state, move |rt| {
        let module = rt.rate_limit.clone()?;
        let now = rt.ledger.now();
        Some((module.limits(), member.map(|m| module.withdrawn_in_period(&m, now))))
    })
    .await?
    .ok_or_else(|| disabled("rate limit"))?;
    Ok(serde_json::json!({"limits": limits, "withdrawn_in_period": used}))
}

pub async fn set_rate_limits(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let limits: RateLimits = serde_json::from_value(
        params
            .get("limits")
            .cloned()
            .ok_or_else(|| RpcError::invalid_params("limits required"))?,
    )
    .map_err(|e| RpcError::invalid_params(&e.to_string()))?;
    ledger_read(state, move |rt| {
        let module = rt.rate_limit.clone()?;
        Some(module.set_limits(&rt.ledger, &caller, limits))
    })
    .await?
    .ok_or_else(|| disabled("rate limit"))??;
    Ok(serde_json::json!({"limits": limits}))
}

/// Redirect withdrawals to `recipient` into `destination`; omit
/// `destination` to remove the route.
pub async fn set_route(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let recipient = address(params, "recipient")?;
    let destination = optional_address(params, "destination")?;
    ledger_read(state, move |rt| {
        let routing = rt.routing.clone()?;
        Some(routing.set_route(&rt.ledger, &caller, recipient, destination))
    })
    .await?
    .ok_or_else(|| disabled("routing"))??;
    Ok(serde_json::json!({"recipient": recipient, "destination": destination}))
}

pub async fn lock_modules(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    ledger_call(state, move |rt| rt.ledger.lock_modules(&caller)).await?;
    Ok(serde_json::json!({"locked": true}))
}
