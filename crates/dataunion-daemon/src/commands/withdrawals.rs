//! Withdrawal handlers.
//!
//! An absent `amount` means "everything withdrawable". Signed variants take
//! the hex-encoded 65-byte envelope in `signature`.

use std::sync::Arc;

use serde_json::Value;

use super::{address, address_list, amount, ledger_call, optional_amount, signature, Result};
use crate::DaemonState;

/// Withdraw a member's earnings to the member. Caller: the member or the owner.
pub async fn withdraw(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let member = address(params, "member")?;
    let withdrawn = match optional_amount(params, "amount")? {
        Some(amount) => ledger_call(state, move |rt| rt.ledger.withdraw(&caller, &member, amount)).await?,
        None => ledger_call(state, move |rt| rt.ledger.withdraw_all(&caller, &member)).await?,
    };
    Ok(serde_json::json!({"withdrawn": withdrawn}))
}

/// Withdraw the caller's own earnings to another account.
pub async fn withdraw_to(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let recipient = address(params, "recipient")?;
    let withdrawn = match optional_amount(params, "amount")? {
        Some(amount) => ledger_call(state, move |rt| rt.ledger.withdraw_to(&caller, &recipient, amount)).await?,
        None => ledger_call(state, move |rt| rt.ledger.withdraw_all_to(&caller, &recipient)).await?,
    };
    Ok(serde_json::json!({"withdrawn": withdrawn}))
}

/// Anyone may submit a member's signed authorization.
pub async fn withdraw_to_signed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = address(params, "member")?;
    let recipient = address(params, "recipient")?;
    let amount = amount(params, "amount")?;
    let sig = signature(params, "signature")?;
    let withdrawn = ledger_call(state, move |rt| {
        rt.ledger.withdraw_to_signed(&member, &recipient, amount, &sig)
    })
    .await?;
    Ok(serde_json::json!({"withdrawn": withdrawn}))
}

pub async fn withdraw_all_to_signed(state: &Arc<DaemonState>, params: &Value) -> Result {
    let member = address(params, "member")?;
    let recipient = address(params, "recipient")?;
    let sig = signature(params, "signature")?;
    let withdrawn = ledger_call(state, move |rt| {
        rt.ledger.withdraw_all_to_signed(&member, &recipient, &sig)
    })
    .await?;
    Ok(serde_json::json!({"withdrawn": withdrawn}))
}

/// Owner-only batch payout of everything withdrawable.
pub async fn withdraw_members(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address(params, "caller")?;
    let members = address_list(params, "members")?;
    let withdrawn = ledger_call(state, move |rt| rt.ledger.withdraw_members(&caller, &members)).await?;
    Ok(serde_json::json!({"withdrawn": withdrawn}))
}

pub async fn signature_is_valid(state: &Arc<DaemonState>, params: &Value) -> Result {
    let signer = address(params, "signer")?;
    let recipient = address(params, "recipient")?;
    let amount = amount(params, "amount")?;
    let sig = signature(params, "signature")?;
    let valid = ledger_call(state, move |rt| {
        rt.ledger.signature_is_valid(&signer, &recipient, amount, &sig)
    })
    .await?;
    Ok(serde_json::json!({"valid": valid}))
}
