//! Event journal queries.

use std::sync::Arc;

use dataunion_db::queries::events;
use serde_json::Value;

use super::{amount, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

fn limit(params: &Value) -> u32 {
    params
        .get("limit")
        .and_then(|v| v.as_u64())
        .map_or(DEFAULT_LIMIT, |l| l.min(MAX_LIMIT as u64) as u32)
}

/// Most recent events, oldest first.
pub async fn recent_events(state: &Arc<DaemonState>, params: &Value) -> Result {
    let db = state.db.lock().await;
    let records = events::recent(&db, limit(params))?;
    Ok(serde_json::json!(records))
}

/// Events with sequence greater than `sequence`, for catching up after a
/// lagged subscription.
pub async fn events_since(state: &Arc<DaemonState>, params: &Value) -> Result {
    let sequence = amount(params, "sequence")?;
    let db = state.db.lock().await;
    let records = events::since(&db, sequence, limit(params))?;
    Ok(serde_json::json!(records))
}

pub async fn events_by_kind(state: &Arc<DaemonState>, params: &Value) -> Result {
    let kind = params
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("kind required"))?;
    let db = state.db.lock().await;
    let records = events::by_kind(&db, kind, limit(params))?;
    Ok(serde_json::json!(records))
}

/// Recompute the digest chain over the whole journal.
pub async fn verify_journal(state: &Arc<DaemonState>) -> Result {
    let db = state.db.lock().await;
    let count = events::count(&db)?;
    match events::verify_chain(&db) {
        Ok(()) => Ok(serde_json::json!({"intact": true, "events": count})),
        Err(dataunion_db::DbError::Corrupted(sequence)) => {
            Ok(serde_json::json!({"intact": false, "events": count, "first_bad_sequence": sequence}))
        }
        Err(e) => Err(e.into()),
    }
}
