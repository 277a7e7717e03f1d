//! Ownership, agent, fee and metadata handlers.

use std::sync::Arc;

use dataunion_ledger::fees::Fraction;
use dataunion_ledger::modules::ListenerSlot;
use serde_json::Value;

use super::{address, ledger_call, ledger_read, optional_amount, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Roles, fees, metadata and module configuration in one snapshot.
pub async fn get_ledger_info(state: &Arc<DaemonState>) -> Result {
    let last_event_sequence = state.event_bus.sequence();
    ledger_read(state, move |rt| {
        let ledger = &rt.ledger;
        serde_json::json!({
            "identity": ledger.identity(),
            "owner": ledger.owner(),
            "pending_owner": ledger.pending_owner(),
            "join_part_agents": ledger.join_part_agents(),
            "admin_fee": ledger.admin_fee().raw(),
            "protocol_fee": ledger.protocol_fee().raw(),
            "metadata": ledger.metadata(),
            "modules": {
                "locked": ledger.modules_locked(),
                "join": ledger.module_names(ListenerSlot::Join),
                "part": ledger.module_names(ListenerSlot::Part),
                "withdraw": ledger.module_names(ListenerSlot::Withdraw),
                "router": ledger.withdraw_router_name(),
            },
            "last_event_sequence": last_event_sequence,
        })
    })
    .await
}

pub async fn transfer_ownership(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let new_owner = address(params, "new_owner")?;
    ledger_call(state, move |rt| rt.ledger.transfer_ownership(&caller, new_owner)).await?;
    Ok(serde_json::json!({"pending_owner": new_owner}))
}

pub async fn claim_ownership(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    ledger_call(state, move |rt| rt.ledger.claim_ownership(&caller)).await?;
    Ok(serde_json::json!({"owner": caller}))
}

pub async fn add_join_part_agent(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let agent = address(params, "agent")?;
    ledger_call(state, move |rt| rt.ledger.add_join_part_agent(&caller, agent)).await?;
    Ok(serde_json::json!({"added": agent}))
}

pub async fn remove_join_part_agent(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let agent = address(params, "agent")?;
    ledger_call(state, move |rt| rt.ledger.remove_join_part_agent(&caller, &agent)).await?;
    Ok(serde_json::json!({"removed": agent}))
}

/// Takes either `fee_bps` or a raw fixed-point `fraction`.
pub async fn set_admin_fee(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let fraction = match (optional_amount(params, "fee_bps")?, optional_amount(params, "fraction")?) {
        (Some(bps), None) => {
            let bps = u32::try_from(bps).map_err(|_| RpcError::invalid_params("fee_bps out of range"))?;
            Fraction::from_bps(bps)
        }
        (None, Some(raw)) => Fraction::from_raw(raw),
        _ => return Err(RpcError::invalid_params("exactly one of fee_bps, fraction required")),
    };
    let admin = ledger_call(state, move |rt| {
        rt.ledger.set_admin_fee(&caller, fraction)?;
        Ok(rt.ledger.admin_fee())
    })
    .await?;
    Ok(serde_json::json!({"admin_fee": admin.raw()}))
}

pub async fn set_metadata(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let metadata = params
        .get("metadata")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("metadata required"))?
        .to_string();
    ledger_call(state, move |rt| rt.ledger.set_metadata(&caller, metadata)).await?;
    Ok(serde_json::json!({"updated": true}))
}

/// Stop the daemon after answering.
pub async fn shutdown(state: &Arc<DaemonState>) -> Result {
    let _ = state.shutdown_tx.send(());
    Ok(serde_json::json!({"shutting_down": true}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::*;

    #[tokio::test]
    async fn test_ledger_info() {
        let state = state();
        let info = get_ledger_info(&state).await.expect("info");
        assert_eq!(info["owner"], hex_addr(OWNER));
        assert_eq!(info["modules"]["join"], serde_json::json!(["ban", "weight", "rate_limit"]));
        assert_eq!(info["modules"]["router"], "routing");
        assert_eq!(info["modules"]["locked"], false);
    }

    #[tokio::test]
    async fn test_two_step_ownership() {
        let state = state();
        transfer_ownership(&state, &serde_json::json!({"caller": hex_addr(OWNER), "new_owner": hex_addr(0x40)}))
            .await
            .expect("propose");

        let err = claim_ownership(&state, &serde_json::json!({"caller": hex_addr(0x41)}))
            .await
            .expect_err("not pending owner");
        assert_eq!(err.code, -32020);

        claim_ownership(&state, &serde_json::json!({"caller": hex_addr(0x40)}))
            .await
            .expect("claim");
        let info = get_ledger_info(&state).await.expect("info");
        assert_eq!(info["owner"], hex_addr(0x40));
        assert_eq!(info["pending_owner"], Value::Null);
    }

    #[tokio::test]
    async fn test_admin_fee_bounds() {
        let state = state();
        let result = set_admin_fee(&state, &serde_json::json!({"caller": hex_addr(OWNER), "fee_bps": 2500}))
            .await
            .expect("set");
        assert_eq!(result["admin_fee"], Fraction::from_bps(2500).raw());

        let err = set_admin_fee(&state, &serde_json::json!({"caller": hex_addr(OWNER), "fee_bps": 10_001}))
            .await
            .expect_err("over 100%");
        assert_eq!(err.code, -32022);

        let err = set_admin_fee(&state, &serde_json::json!({"caller": hex_addr(OWNER)}))
            .await
            .expect_err("no fee given");
        assert_eq!(err.code, -32602);
    }

    #[tokio::test]
    async fn test_agents_and_metadata() {
        let state = state();
        add_join_part_agent(&state, &serde_json::json!({"caller": hex_addr(OWNER), "agent": hex_addr(0x50)}))
            .await
            .expect("add agent");
        let err = add_join_part_agent(&state, &serde_json::json!({"caller": hex_addr(OWNER), "agent": hex_addr(0x50)}))
            .await
            .expect_err("duplicate");
        assert_eq!(err.code, -32021);
        remove_join_part_agent(&state, &serde_json::json!({"caller": hex_addr(OWNER), "agent": hex_addr(0x50)}))
            .await
            .expect("remove agent");

        set_metadata(&state, &serde_json::json!({"caller": hex_addr(OWNER), "metadata": "{\"name\":\"du\"}"}))
            .await
            .expect("metadata");
        let info = get_ledger_info(&state).await.expect("info");
        assert_eq!(info["metadata"], "{\"name\":\"du\"}");
    }
}
