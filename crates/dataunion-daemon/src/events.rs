//! Event fan-out to RPC subscribers.
//!
//! The actor journals every ledger event and then broadcasts the resulting
//! [`EventRecord`] here. Slow subscribers lag and miss events; the journal
//! stays authoritative and can be replayed with `get_events_since`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dataunion_types::events::{EventRecord, LedgerEvent};
use dataunion_types::Address;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Event names, e.g. `"MemberJoined"`. `None` = all.
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
    /// Only events that involve one of these addresses.
    #[serde(default)]
    pub addresses: Option<Vec<Address>>,
}

/// Event bus for broadcasting journaled events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit a record to all subscribers.
    pub fn emit(&self, record: EventRecord) {
        self.sequence.store(record.sequence, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.sender.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Sequence number of the last emitted record.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.iter().any(|k| k == event.name()) {
                return false;
            }
        }

        if let Some(ref addresses) = self.addresses {
            let involved = involved_addresses(event);
            if !addresses.iter().any(|a| involved.contains(a)) {
                return false;
            }
        }

        true
    }
}

/// Addresses an event is about.
fn involved_addresses(event: &LedgerEvent) -> Vec<Address> {
    match event {
        LedgerEvent::MemberJoined { member, .. }
        | LedgerEvent::MemberParted { member, .. }
        | LedgerEvent::MemberWeightChanged { member, .. } => vec![*member],
        LedgerEvent::EarningsWithdrawn { member, recipient, .. } => vec![*member, *recipient],
        LedgerEvent::TransferWithinContract { from, to, .. }
        | LedgerEvent::TransferToAddressInContract { from, to, .. } => vec![*from, *to],
        LedgerEvent::JoinPartAgentAdded { agent } | LedgerEvent::JoinPartAgentRemoved { agent } => vec![*agent],
        LedgerEvent::OwnershipTransferProposed { owner, pending_owner } => vec![*owner, *pending_owner],
        LedgerEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        } => vec![*previous_owner, *new_owner],
        _ => Vec::new(),
    }
}
