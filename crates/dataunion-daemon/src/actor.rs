//! Single-writer ledger actor.
//!
//! One tokio task owns the [`Runtime`] (the ledger plus its built-in
//! modules). Every RPC command is a closure sent over an `mpsc` mailbox and
//! answered on a `oneshot`, so operations never interleave. After each job
//! the actor drains the ledger's events, appends them to the SQLite journal
//! and broadcasts the journaled records. The reply is released only after
//! that, so a caller always finds its own events in the journal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dataunion_ledger::clock::{Clock, SystemClock};
use dataunion_ledger::ledger::LedgerConfig;
use dataunion_ledger::modules::ban::BanModule;
use dataunion_ledger::modules::rate_limit::RateLimitModule;
use dataunion_ledger::modules::routing::RoutingWithdrawModule;
use dataunion_ledger::modules::weight::WeightModule;
use dataunion_ledger::modules::{ListenerSlot, LedgerModule, WithdrawRouter};
use dataunion_ledger::oracle::FixedFeeOracle;
use dataunion_ledger::token::InMemoryToken;
use dataunion_ledger::Ledger;
use dataunion_types::events::{EventRecord, LedgerEvent};
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{parse_address, require_address, DaemonConfig};
use crate::events::EventBus;

pub use dataunion_db::queries::settings::LAST_REFRESH_AT as LAST_REFRESH_KEY;

/// Everything the actor owns.
pub struct Runtime {
    pub ledger: Ledger<InMemoryToken>,
    pub oracle: Arc<FixedFeeOracle>,
    pub ban: Option<Arc<BanModule>>,
    pub weights: Option<Arc<WeightModule>>,
    pub rate_limit: Option<Arc<RateLimitModule>>,
    pub routing: Option<Arc<RoutingWithdrawModule>>,
}

impl Runtime {
    /// Build and initialize a ledger from configuration, using the system clock.
    pub fn from_config(config: &DaemonConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &DaemonConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let identity = require_address("ledger.identity", &config.ledger.identity)?;
        let owner = require_address("ledger.owner", &config.ledger.owner)?;
        let beneficiary = parse_address("protocol.beneficiary", &config.protocol.beneficiary)?.unwrap_or(owner);

        let mut balances = Vec::with_capacity(config.token.balances.len());
        for (account, amount) in &config.token.balances {
            let address = require_address("token.balances", account)?;
            balances.push((address, *amount));
        }
        let token = InMemoryToken::with_balances(balances);

        let oracle = Arc::new(FixedFeeOracle::new(config.protocol_fee(), beneficiary));
        let mut ledger = Ledger::new(identity, token, oracle.clone(), clock);

        let mut agents = Vec::new();
        for agent in &config.ledger.join_part_agents {
            agents.push(require_address("ledger.join_part_agents", agent)?);
        }

        let modules = &config.modules;
        let ban = if modules.ban_enabled {
            let agent = require_address("modules.ban_agent", &modules.ban_agent)?;
            agents.push(agent);
            Some(Arc::new(BanModule::new(agent)))
        } else {
            None
        };
        let weights = if modules.weights_enabled {
            let agent = require_address("modules.weight_agent", &modules.weight_agent)?;
            agents.push(agent);
            Some(Arc::new(WeightModule::new(agent)))
        } else {
            None
        };
        if config.join_server.enabled {
            agents.push(require_address("join_server.agent", &config.join_server.agent)?);
        }
        agents.sort();
        agents.dedup();

        ledger
            .initialize(LedgerConfig {
                owner,
                admin_fee: config.admin_fee(),
                join_part_agents: agents,
                metadata: config.ledger.metadata.clone(),
            })
            .context("initializing ledger")?;

        let rate_limit = modules
            .rate_limit_enabled
            .then(|| Arc::new(RateLimitModule::new(modules.rate_limits)));
        let routing = modules
            .routing_enabled
            .then(|| Arc::new(RoutingWithdrawModule::new()));

        if let Some(ban) = &ban {
            ledger.register_module(&owner, ListenerSlot::Join, ban.clone() as Arc<dyn LedgerModule>)?;
        }
        if let Some(weights) = &weights {
            ledger.register_module(&owner, ListenerSlot::Join, weights.clone() as Arc<dyn LedgerModule>)?;
        }
        if let Some(rate_limit) = &rate_limit {
            ledger.register_module(&owner, ListenerSlot::Join, rate_limit.clone() as Arc<dyn LedgerModule>)?;
            ledger.register_module(&owner, ListenerSlot::Withdraw, rate_limit.clone() as Arc<dyn LedgerModule>)?;
        }
        if let Some(routing) = &routing {
            ledger.set_withdraw_router(&owner, Some(routing.clone() as Arc<dyn WithdrawRouter>))?;
        }
        if modules.lock_after_setup {
            ledger.lock_modules(&owner)?;
        }

        info!(
            %identity,
            %owner,
            ban = ban.is_some(),
            weights = weights.is_some(),
            rate_limit = rate_limit.is_some(),
            routing = routing.is_some(),
            "ledger runtime ready"
        );

        Ok(Self {
            ledger,
            oracle,
            ban,
            weights,
            rate_limit,
            routing,
        })
    }
}

/// Errors reaching the actor.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActorError {
    /// Mailbox full, or the actor has stopped.
    #[error("ledger actor unavailable")]
    Unavailable,
}

/// Errors a caller may retry.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ActorError {
    fn is_transient(&self) -> bool {
        matches!(self, ActorError::Unavailable)
    }
}

type Reply = Box<dyn FnOnce() + Send>;
type Job = Box<dyn FnOnce(&mut Runtime) -> Reply + Send>;

/// Cloneable handle for submitting work to the actor.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<Job>,
}

impl LedgerHandle {
    /// Run `f` against the runtime and wait for its result.
    ///
    /// Fails fast with [`ActorError::Unavailable`] when the mailbox is full;
    /// wrap in [`with_backoff`] to retry.
    pub async fn call<F, R>(&self, f: F) -> Result<R, ActorError>
    where
        F: FnOnce(&mut Runtime) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |runtime: &mut Runtime| -> Reply {
            let result = f(runtime);
            Box::new(move || {
                let _ = reply_tx.send(result);
            })
        });
        self.tx.try_send(job).map_err(|_| ActorError::Unavailable)?;
        reply_rx.await.map_err(|_| ActorError::Unavailable)
    }
}

/// Spawn the actor task.
pub fn spawn(
    runtime: Runtime,
    db: Arc<Mutex<Connection>>,
    event_bus: EventBus,
    capacity: usize,
) -> (LedgerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run(runtime, rx, db, event_bus));
    (LedgerHandle { tx }, task)
}

async fn run(mut runtime: Runtime, mut rx: mpsc::Receiver<Job>, db: Arc<Mutex<Connection>>, event_bus: EventBus) {
    // Events emitted during startup (initialize, module registration).
    journal(&mut runtime, &db, &event_bus).await;

    while let Some(job) = rx.recv().await {
        let reply = job(&mut runtime);
        journal(&mut runtime, &db, &event_bus).await;
        reply();
    }
    info!("ledger actor stopped");
}

/// Append pending ledger events to the journal and broadcast them.
async fn journal(runtime: &mut Runtime, db: &Arc<Mutex<Connection>>, event_bus: &EventBus) {
    let events = runtime.ledger.take_events();
    if events.is_empty() {
        return;
    }
    let timestamp = runtime.ledger.now();

    let mut conn = db.lock().await;
    let sequences = match dataunion_db::queries::events::append(&mut conn, timestamp, &events) {
        Ok(sequences) => sequences,
        Err(e) => {
            // Retried after the next job.
            error!(count = events.len(), "failed to journal ledger events: {e}");
            runtime.ledger.requeue_events(events);
            return;
        }
    };
    if events.iter().any(|e| matches!(e, LedgerEvent::RevenueReceived { .. })) {
        if let Err(e) = dataunion_db::queries::settings::set(&conn, LAST_REFRESH_KEY, &timestamp.to_string()) {
            warn!("failed to record refresh time: {e}");
        }
    }
    drop(conn);

    debug!(count = events.len(), "journaled ledger events");
    for (sequence, event) in sequences.into_iter().zip(events) {
        event_bus.emit(EventRecord {
            sequence,
            timestamp,
            event,
        });
    }
}

/// Exponential backoff parameters for [`with_backoff`].
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            factor: 2,
            max_attempts: 5,
        }
    }
}

/// Retry `op` while it fails with a transient error.
///
/// Non-transient errors, and the last transient one, are returned as-is.
pub async fn with_backoff<F, Fut, T, E>(backoff: Backoff, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let mut delay = backoff.base;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < backoff.max_attempts => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying: {e}");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(backoff.factor);
                attempt += 1;
            }
            result => return result,
        }
    }
}
