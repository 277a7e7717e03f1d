//! Membership handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{address, address_list, amount, ledger_call, ledger_read, optional_amount, weighted_list, Result};
use crate::join_server::{self, JoinError, JoinRequest};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Add one member. `weight` is optional.
pub async fn add_member(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    match optional_amount(params, "weight")? {
        Some(weight) => {
            ledger_call(state, move |rt| rt.ledger.add_member_with_weight(&caller, member, weight)).await?
        }
        None => ledger_call(state, move |rt| rt.ledger.add_member(&caller, member)).await?,
    }
    Ok(serde_json::json!({"added": member}))
}

/// Add a batch, all or nothing. Accepts `members` (addresses) or
/// `weighted` (`[{member, weight}]`).
pub async fn add_members(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let count = if params.get("weighted").is_some() {
        let members = weighted_list(params, "weighted")?;
        let count = members.len();
        ledger_call(state, move |rt| rt.ledger.add_members_with_weights(&caller, &members)).await?;
        count
    } else {
        let members = address_list(params, "members")?;
        let count = members.len();
        ledger_call(state, move |rt| rt.ledger.add_members(&caller, &members)).await?;
        count
    };
    Ok(serde_json::json!({"added": count}))
}

pub async fn part_member(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    ledger_call(state, move |rt| rt.ledger.part_member(&caller, member)).await?;
    Ok(serde_json::json!({"parted": member}))
}

pub async fn part_members(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let members = address_list(params, "members")?;
    let count = members.len();
    ledger_call(state, move |rt| rt.ledger.part_members(&caller, &members)).await?;
    Ok(serde_json::json!({"parted": count}))
}

pub async fn set_member_weight(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    let weight = amount(params, "weight")?;
    ledger_call(state, move |rt| rt.ledger.set_member_weight(&caller, member, weight)).await?;
    Ok(serde_json::json!({"member": member, "weight": weight}))
}

pub async fn set_member_weights(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let members = weighted_list(params, "weighted")?;
    let count = members.len();
    ledger_call(state, move |rt| rt.ledger.set_member_weights(&caller, &members)).await?;
    Ok(serde_json::json!({"updated": count}))
}

pub async fn get_member_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = address(params, "member")?;
    let info = ledger_call(state, move |rt| rt.ledger.get_member_info(&member)).await?;
    serde_json::to_value(&info).map_err(|e| RpcError::internal_error(&e.to_string()))
}

pub async fn get_earnings(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = address(params, "member")?;
    let earnings = ledger_call(state, move |rt| rt.ledger.get_earnings(&member)).await?;
    Ok(serde_json::json!({"member": member, "earnings": earnings}))
}

pub async fn get_withdrawable_earnings(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = address(params, "member")?;
    let withdrawable = ledger_call(state, move |rt| rt.ledger.get_withdrawable_earnings(&member)).await?;
    Ok(serde_json::json!({"member": member, "withdrawable": withdrawable}))
}

pub async fn active_members(state: &Arc<DaemonState>) -> Result {
    let members = ledger_read(state, |rt| rt.ledger.active_members()).await?;
    Ok(serde_json::json!({"members": members}))
}

/// Signed self-service join through the join server.
pub async fn join_request(state: &Arc<DaemonState>, params: &Value) -> Result {
    let join = &state.config.join_server;
    if !join.enabled {
        return Err(JoinError::Disabled.into());
    }
    let agent = crate::config::require_address("join_server.agent", &join.agent)
        .map_err(|e| RpcError::internal_error(&e.to_string()))?;
    let request: JoinRequest =
        serde_json::from_value(params.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))?;
    let member = request.member;
    let outcome = join_server::handle(&state.ledger, agent, join.tolerance_seconds, request).await?;
    Ok(serde_json::json!({"member": member, "outcome": outcome}))
}
