//! dataunion-daemon: runs one Data Union ledger.
//!
//! Single OS process running a Tokio async runtime. The ledger lives in a
//! single-writer actor task; clients talk to it via JSON-RPC over a Unix
//! socket in the data directory. Every ledger event is journaled to SQLite.

mod actor;
mod commands;
mod config;
mod events;
mod join_server;
mod rpc;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dataunion_db::queries::settings;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::actor::{LedgerHandle, Runtime};
use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Event journal and settings.
    pub db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Mailbox of the ledger actor.
    pub ledger: LedgerHandle,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Open the journal and make sure it belongs to the configured ledger.
/// A fresh journal is bound to it on first start.
fn open_journal(config: &DaemonConfig, path: &Path) -> anyhow::Result<rusqlite::Connection> {
    let conn = dataunion_db::open(path).with_context(|| format!("opening {}", path.display()))?;
    let identity = config::require_address("ledger.identity", &config.ledger.identity)?.to_hex();
    match settings::get(&conn, settings::LEDGER_IDENTITY)? {
        bound if bound.is_empty() => {
            settings::set(&conn, settings::LEDGER_IDENTITY, &identity)?;
            info!(ledger = %identity, "journal bound");
        }
        bound if bound != identity => {
            anyhow::bail!("{} journals ledger {bound}, not {identity}", path.display());
        }
        _ => {}
    }
    Ok(conn)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load()?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.advanced.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    info!(data_dir = %data_dir.display(), "dataunion daemon starting");

    let db = Arc::new(tokio::sync::Mutex::new(open_journal(&config, &data_dir.join("dataunion.db"))?));

    let runtime = Runtime::from_config(&config)?;
    let event_bus = EventBus::new(1000);
    let (ledger, actor_task) = actor::spawn(runtime, db.clone(), event_bus.clone(), config.advanced.mailbox_capacity);

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let state = Arc::new(DaemonState {
        db,
        config,
        event_bus,
        ledger,
        shutdown_tx,
    });

    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    info!(socket = %socket_path.display(), "listening for JSON-RPC");

    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "RPC server failed");
            }
        }
        _ = shutdown_rx.recv() => info!("shutdown requested over RPC"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    // The actor drains nothing further once the RPC side is gone.
    drop(state);
    actor_task.abort();
    let _ = std::fs::remove_file(&socket_path);
    info!("dataunion daemon stopped");
    Ok(())
}
