//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! line-delimited JSON-RPC method calls to the command handlers. A
//! connection may also subscribe to ledger events; matching records are
//! pushed as `ledger_event` notifications on the same connection.
//!
//! The socket is a local trust boundary: `caller` parameters are taken as
//! given. Members outside it authenticate through `join_request` and
//! signed withdrawals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dataunion_ledger::{ErrorKind, LedgerError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actor::ActorError;
use crate::commands;
use crate::events::{EventBus, EventFilter};
use crate::join_server::JoinError;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, "METHOD_NOT_FOUND", Some(serde_json::json!({"method": method})))
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(-32602, "INVALID_PARAMS", Some(serde_json::json!({"detail": detail})))
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(-32603, "INTERNAL_ERROR", Some(serde_json::json!({"detail": detail})))
    }

    // Ledger errors, one code per category

    /// Not authorized (-32020).
    pub fn not_authorized(detail: &str) -> Self {
        Self::new(-32020, "NOT_AUTHORIZED", Some(serde_json::json!({"detail": detail})))
    }

    /// Invalid state (-32021).
    pub fn invalid_state(detail: &str) -> Self {
        Self::new(-32021, "INVALID_STATE", Some(serde_json::json!({"detail": detail})))
    }

    /// Invalid value (-32022).
    pub fn invalid_value(detail: &str) -> Self {
        Self::new(-32022, "INVALID_VALUE", Some(serde_json::json!({"detail": detail})))
    }

    /// Bad signature (-32030).
    pub fn bad_signature(detail: &str, data: Option<serde_json::Value>) -> Self {
        let mut data = data.unwrap_or_else(|| serde_json::json!({}));
        data["detail"] = serde_json::json!(detail);
        Self::new(-32030, "BAD_SIGNATURE", Some(data))
    }

    /// Insufficient balance (-32040).
    pub fn insufficient_balance(required: u64, available: u64) -> Self {
        Self::new(
            -32040,
            "INSUFFICIENT_BALANCE",
            Some(serde_json::json!({"required": required, "available": available})),
        )
    }

    /// Module veto (-32045).
    pub fn module_veto(module: &str, reason: &str) -> Self {
        Self::new(
            -32045,
            "MODULE_VETO",
            Some(serde_json::json!({"module": module, "reason": reason})),
        )
    }

    /// Ledger actor unavailable (-32050). Safe to retry.
    pub fn unavailable() -> Self {
        Self::new(-32050, "LEDGER_UNAVAILABLE", None)
    }

    /// Join request rejected (-32060).
    pub fn join_rejected(detail: &str) -> Self {
        Self::new(-32060, "JOIN_REJECTED", Some(serde_json::json!({"detail": detail})))
    }
}

impl From<LedgerError> for RpcError {
    fn from(err: LedgerError) -> Self {
        let detail = err.to_string();
        match err {
            LedgerError::BadSignature {
                signer,
                withdrawn_earnings,
            } => RpcError::bad_signature(
                &detail,
                Some(serde_json::json!({"signer": signer, "withdrawn_earnings": withdrawn_earnings})),
            ),
            LedgerError::InsufficientWithdrawable {
                requested, available, ..
            } => RpcError::insufficient_balance(requested, available),
            LedgerError::ModuleVeto { module, reason } => RpcError::module_veto(&module, &reason),
            other => match other.kind() {
                ErrorKind::Authorization => RpcError::not_authorized(&detail),
                ErrorKind::State => RpcError::invalid_state(&detail),
                ErrorKind::Value => RpcError::invalid_value(&detail),
                ErrorKind::Signature => RpcError::bad_signature(&detail, None),
                ErrorKind::InsufficientFunds => {
                    Self::new(-32040, "INSUFFICIENT_BALANCE", Some(serde_json::json!({"detail": detail})))
                }
                ErrorKind::Module => Self::new(-32045, "MODULE_VETO", Some(serde_json::json!({"detail": detail}))),
            },
        }
    }
}

impl From<ActorError> for RpcError {
    fn from(_: ActorError) -> Self {
        RpcError::unavailable()
    }
}

impl From<JoinError> for RpcError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::Ledger(e) => e.into(),
            JoinError::Actor(e) => e.into(),
            other => RpcError::join_rejected(&other.to_string()),
        }
    }
}

impl From<dataunion_db::DbError> for RpcError {
    fn from(err: dataunion_db::DbError) -> Self {
        RpcError::internal_error(&format!("db error: {err}"))
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(state: Arc<DaemonState>, stream: tokio::net::UnixStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Responses and notifications share the writer.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
    let writer_task = tokio::spawn(async move {
        while let Some(mut message) = out_rx.recv().await {
            message.push('\n');
            if writer.write_all(message.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if request.jsonrpc != "2.0" => RpcResponse::error(request.id, RpcError::invalid_request()),
            Ok(request) => match request.method.as_str() {
                "subscribe_events" => {
                    let result = subscribe(&state.event_bus, &request.params, out_tx.clone(), &mut subscriptions);
                    respond(request.id, result)
                }
                "unsubscribe_events" => respond(request.id, unsubscribe(&request.params, &mut subscriptions)),
                _ => dispatch_request(state.clone(), request).await,
            },
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        if out_tx.send(serde_json::to_string(&response)?).await.is_err() {
            break;
        }
    }

    for (_, task) in subscriptions.drain() {
        task.abort();
    }
    drop(out_tx);
    let _ = writer_task.await;
    Ok(())
}

fn respond(id: serde_json::Value, result: commands::Result) -> RpcResponse {
    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

/// Start forwarding bus records matching `params.filter` to this connection.
fn subscribe(
    bus: &EventBus,
    params: &serde_json::Value,
    out: mpsc::Sender<String>,
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
) -> commands::Result {
    let filter: EventFilter = match params.get("filter") {
        Some(f) => serde_json::from_value(f.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))?,
        None => EventFilter::default(),
    };

    let mut sub_id = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut sub_id);
    let sub_id = hex::encode(sub_id);

    let mut rx = bus.subscribe();
    let id = sub_id.clone();
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) if filter.matches(&record.event) => {
                    let notification = serde_json::json!({
                        "jsonrpc": "2.0",
                        "method": "ledger_event",
                        "params": {"subscription_id": id, "record": record},
                    });
                    if out.send(notification.to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(subscription = %id, missed, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    subscriptions.insert(sub_id.clone(), task);
    debug!(subscription = %sub_id, "events subscribed");

    Ok(serde_json::json!({"subscription_id": sub_id}))
}

fn unsubscribe(params: &serde_json::Value, subscriptions: &mut HashMap<String, JoinHandle<()>>) -> commands::Result {
    let sub_id = params
        .get("subscription_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("subscription_id required"))?;
    let task = subscriptions.remove(sub_id);
    let unsubscribed = task.is_some();
    if let Some(task) = task {
        task.abort();
    }
    Ok(serde_json::json!({"unsubscribed": unsubscribed}))
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub(crate) async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Revenue
        "refresh_revenue" => commands::revenue::refresh_revenue(&state).await,
        "pay_revenue" => commands::revenue::pay_revenue(&state, params).await,
        "transfer_to_member_in_contract" => commands::revenue::transfer_to_member_in_contract(&state, params).await,
        "transfer_within_contract" => commands::revenue::transfer_within_contract(&state, params).await,
        "sync_protocol_fee" => commands::revenue::sync_protocol_fee(&state).await,
        "get_stats" => commands::revenue::get_stats(&state).await,
        "get_token_balance" => commands::revenue::get_token_balance(&state, params).await,

        // Members
        "add_member" => commands::members::add_member(&state, params).await,
        "add_members" => commands::members::add_members(&state, params).await,
        "part_member" => commands::members::part_member(&state, params).await,
        "part_members" => commands::members::part_members(&state, params).await,
        "set_member_weight" => commands::members::set_member_weight(&state, params).await,
        "set_member_weights" => commands::members::set_member_weights(&state, params).await,
        "get_member_info" => commands::members::get_member_info(&state, params).await,
        "get_earnings" => commands::members::get_earnings(&state, params).await,
        "get_withdrawable_earnings" => commands::members::get_withdrawable_earnings(&state, params).await,
        "active_members" => commands::members::active_members(&state).await,
        "join_request" => commands::members::join_request(&state, params).await,

        // Withdrawals
        "withdraw" => commands::withdrawals::withdraw(&state, params).await,
        "withdraw_to" => commands::withdrawals::withdraw_to(&state, params).await,
        "withdraw_to_signed" => commands::withdrawals::withdraw_to_signed(&state, params).await,
        "withdraw_all_to_signed" => commands::withdrawals::withdraw_all_to_signed(&state, params).await,
        "withdraw_members" => commands::withdrawals::withdraw_members(&state, params).await,
        "signature_is_valid" => commands::withdrawals::signature_is_valid(&state, params).await,

        // Administration
        "get_ledger_info" => commands::admin::get_ledger_info(&state).await,
        "transfer_ownership" => commands::admin::transfer_ownership(&state, params).await,
        "claim_ownership" => commands::admin::claim_ownership(&state, params).await,
        "add_join_part_agent" => commands::admin::add_join_part_agent(&state, params).await,
        "remove_join_part_agent" => commands::admin::remove_join_part_agent(&state, params).await,
        "set_admin_fee" => commands::admin::set_admin_fee(&state, params).await,
        "set_metadata" => commands::admin::set_metadata(&state, params).await,
        "shutdown" => commands::admin::shutdown(&state).await,

        // Modules
        "ban_member" => commands::modules::ban_member(&state, params).await,
        "restore_member" => commands::modules::restore_member(&state, params).await,
        "get_ban" => commands::modules::get_ban(&state, params).await,
        "set_weight" => commands::modules::set_weight(&state, params).await,
        "get_rate_limits" => commands::modules::get_rate_limits(&state, params).await,
        "set_rate_limits" => commands::modules::set_rate_limits(&state, params).await,
        "set_route" => commands::modules::set_route(&state, params).await,
        "lock_modules" => commands::modules::lock_modules(&state, params).await,

        // Journal
        "recent_events" => commands::journal::recent_events(&state, params).await,
        "events_since" => commands::journal::events_since(&state, params).await,
        "events_by_kind" => commands::journal::events_by_kind(&state, params).await,
        "verify_journal" => commands::journal::verify_journal(&state).await,

        // Dev-only commands
        "dev_set_protocol_fee" => commands::revenue::dev_set_protocol_fee(&state, params).await,
        "dev_mint" => commands::revenue::dev_mint(&state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    respond(id, result)
}

#[cfg(test)]
mod tests {
    use dataunion_types::Address;

    use super::*;

    #[test]
    fn test_rpc_error_codes() {
        let err = RpcError::insufficient_balance(100, 50);
        assert_eq!(err.code, -32040);

        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);

        assert_eq!(RpcError::unavailable().code, -32050);
    }

    #[test]
    fn test_ledger_error_mapping() {
        let who = Address::from_bytes([7u8; 32]);

        let err: RpcError = LedgerError::NotOwner { caller: who }.into();
        assert_eq!(err.message, "NOT_AUTHORIZED");

        let err: RpcError = LedgerError::NotActiveMember(who).into();
        assert_eq!(err.code, -32021);

        let err: RpcError = LedgerError::BadSignature {
            signer: who,
            withdrawn_earnings: 42,
        }
        .into();
        assert_eq!(err.code, -32030);
        let data = err.data.expect("data");
        assert_eq!(data["withdrawn_earnings"], 42);
        assert_eq!(data["signer"], who.to_hex());

        let err: RpcError = LedgerError::BadSignatureLength { len: 3 }.into();
        assert_eq!(err.code, -32030);

        let err: RpcError = LedgerError::InsufficientWithdrawable {
            member: who,
            requested: 10,
            available: 4,
        }
        .into();
        assert_eq!(err.data.expect("data")["available"], 4);

        let err: RpcError = LedgerError::ModuleVeto {
            module: "ban".to_string(),
            reason: "banned".to_string(),
        }
        .into();
        assert_eq!(err.code, -32045);
    }

    #[test]
    fn test_rpc_response_success() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"amount": 1000}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn test_rpc_response_error() {
        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        assert!(resp.error.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let bus = EventBus::new(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let mut subs = HashMap::new();

        let result = subscribe(
            &bus,
            &serde_json::json!({"filter": {"kinds": ["RevenueReceived"]}}),
            out_tx,
            &mut subs,
        )
        .expect("subscribe");
        let sub_id = result["subscription_id"].as_str().expect("id").to_string();

        bus.emit(dataunion_types::events::EventRecord {
            sequence: 1,
            timestamp: 0,
            event: dataunion_types::events::LedgerEvent::ModulesLocked,
        });
        bus.emit(dataunion_types::events::EventRecord {
            sequence: 2,
            timestamp: 0,
            event: dataunion_types::events::LedgerEvent::RevenueReceived { amount: 9 },
        });

        let line = out_rx.recv().await.expect("notification");
        let value: serde_json::Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["method"], "ledger_event");
        assert_eq!(value["params"]["record"]["sequence"], 2);

        let result = unsubscribe(&serde_json::json!({"subscription_id": sub_id}), &mut subs).expect("unsubscribe");
        assert_eq!(result["unsubscribed"], true);
        let result = unsubscribe(&serde_json::json!({"subscription_id": sub_id}), &mut subs).expect("unsubscribe");
        assert_eq!(result["unsubscribed"], false);
    }

    #[tokio::test]
    async fn test_dispatch() {
        let state = crate::commands::test_support::state();
        let request = |method: &str| RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(1),
            method: method.to_string(),
            params: serde_json::json!({}),
        };

        let resp = dispatch_request(state.clone(), request("get_stats")).await;
        assert_eq!(resp.result.expect("stats")["total_revenue"], 0);

        let resp = dispatch_request(state.clone(), request("no_such_method")).await;
        assert_eq!(resp.error.expect("error").code, -32601);

        let resp = dispatch_request(state, request("add_member")).await;
        assert_eq!(resp.error.expect("error").code, -32602);
    }
}
