//! Revenue intake and statistics handlers.

use std::sync::Arc;

use dataunion_ledger::fees::Fraction;
use dataunion_ledger::token::Token;
use serde_json::Value;

use super::{address, amount, ledger_call, ledger_read, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Recognize tokens that arrived since the last refresh.
pub async fn refresh_revenue(state: &Arc<DaemonState>) -> Result {
    let recognized = ledger_call(state, |rt| rt.ledger.refresh_revenue()).await?;
    Ok(serde_json::json!({"recognized": recognized}))
}

/// Pull `amount` from `payer` into the ledger and distribute it.
pub async fn pay_revenue(state: &Arc<DaemonState>, params: &Value) -> Result {
    let payer = address(params, "payer")?;
    let amount = amount(params, "amount")?;
    let recognized = ledger_call(state, move |rt| rt.ledger.pay_revenue(&payer, amount)).await?;
    Ok(serde_json::json!({"recognized": recognized}))
}

pub async fn transfer_to_member_in_contract(state: &Arc<DaemonState>, params: &Value) -> Result {
    let payer = address(params, "payer")?;
    let member = address(params, "member")?;
    let amount = amount(params, "amount")?;
    ledger_call(state, move |rt| {
        rt.ledger.transfer_to_member_in_contract(&payer, &member, amount)
    })
    .await?;
    Ok(serde_json::json!({"credited": amount}))
}

pub async fn transfer_within_contract(state: &Arc<DaemonState>, params: &Value) -> Result {
    let sender = address(params, "sender")?;
    let recipient = address(params, "recipient")?;
    let amount = amount(params, "amount")?;
    ledger_call(state, move |rt| {
        rt.ledger.transfer_within_contract(&sender, &recipient, amount)
    })
    .await?;
    Ok(serde_json::json!({"transferred": amount}))
}

pub async fn sync_protocol_fee(state: &Arc<DaemonState>) -> Result {
    let (admin, protocol) = ledger_call(state, |rt| {
        rt.ledger.sync_protocol_fee()?;
        Ok((rt.ledger.admin_fee(), rt.ledger.protocol_fee()))
    })
    .await?;
    Ok(serde_json::json!({"admin_fee": admin.raw(), "protocol_fee": protocol.raw()}))
}

pub async fn get_stats(state: &Arc<DaemonState>) -> Result {
    let (stats, unaccounted) = ledger_read(state, |rt| (rt.ledger.get_stats(), rt.ledger.unaccounted_revenue())).await?;
    let mut value = serde_json::to_value(&stats).map_err(|e| RpcError::internal_error(&e.to_string()))?;
    value["unaccounted_revenue"] = serde_json::json!(unaccounted);
    value["conserved"] = serde_json::json!(stats.is_conserved());
    Ok(value)
}

pub async fn get_token_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = address(params, "account")?;
    let balance = ledger_read(state, move |rt| rt.ledger.token().balance_of(&account)).await?;
    Ok(serde_json::json!({"account": account, "balance": balance}))
}

/// Report a new protocol fee from the built-in oracle. Takes effect at the
/// next refresh or explicit sync.
pub async fn dev_set_protocol_fee(state: &Arc<DaemonState>, params: &Value) -> Result {
    let bps = amount(params, "fee_bps")?;
    let bps = u32::try_from(bps).map_err(|_| RpcError::invalid_params("fee_bps out of range"))?;
    ledger_read(state, move |rt| rt.oracle.set_protocol_fee(Fraction::from_bps(bps))).await?;
    Ok(serde_json::json!({"fee_bps": bps}))
}

/// Mint tokens into an account. Minting into the ledger identity models a
/// plain token transfer that bypasses `pay_revenue`.
pub async fn dev_mint(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = address(params, "account")?;
    let amount = amount(params, "amount")?;
    ledger_read(state, move |rt| rt.ledger.token_mut().mint(&account, amount))
        .await?
        .map_err(|e| RpcError::invalid_value(&e.to_string()))?;
    Ok(serde_json::json!({"minted": amount}))
}
