//! Ledger events for external indexers.
//!
//! Every successful mutating operation emits zero or more [`LedgerEvent`]s.
//! Failed operations emit nothing.

use serde::{Deserialize, Serialize};

use crate::member::PartReason;
use crate::{Address, Amount, Weight};

/// All events emitted by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    MemberJoined {
        member: Address,
        weight: Weight,
    },
    MemberParted {
        member: Address,
        reason: PartReason,
    },
    MemberWeightChanged {
        member: Address,
        old_weight: Weight,
        new_weight: Weight,
    },
    /// A refresh recognized new revenue.
    RevenueReceived {
        amount: Amount,
    },
    FeesCharged {
        admin_fee: Amount,
        protocol_fee: Amount,
    },
    EarningsWithdrawn {
        member: Address,
        recipient: Address,
        amount: Amount,
    },
    TransferWithinContract {
        from: Address,
        to: Address,
        amount: Amount,
    },
    TransferToAddressInContract {
        from: Address,
        to: Address,
        amount: Amount,
    },
    /// Raw fixed-point fraction, `10^18` = 100%.
    AdminFeeChanged {
        fraction: u64,
    },
    ProtocolFeeChanged {
        fraction: u64,
    },
    JoinPartAgentAdded {
        agent: Address,
    },
    JoinPartAgentRemoved {
        agent: Address,
    },
    OwnershipTransferProposed {
        owner: Address,
        pending_owner: Address,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    MetadataChanged {
        metadata: String,
    },
    ModuleRegistered {
        slot: ModuleSlot,
        name: String,
    },
    ModuleRemoved {
        slot: ModuleSlot,
        name: String,
    },
    ModulesLocked,
}

/// Registration slot of an extension module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleSlot {
    JoinListener,
    PartListener,
    WithdrawListener,
    WithdrawRouter,
}

impl LedgerEvent {
    /// Stable event name used for journaling and subscription filters.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemberJoined { .. } => "MemberJoined",
            Self::MemberParted { .. } => "MemberParted",
            Self::MemberWeightChanged { .. } => "MemberWeightChanged",
            Self::RevenueReceived { .. } => "RevenueReceived",
            Self::FeesCharged { .. } => "FeesCharged",
            Self::EarningsWithdrawn { .. } => "EarningsWithdrawn",
            Self::TransferWithinContract { .. } => "TransferWithinContract",
            Self::TransferToAddressInContract { .. } => "TransferToAddressInContract",
            Self::AdminFeeChanged { .. } => "AdminFeeChanged",
            Self::ProtocolFeeChanged { .. } => "ProtocolFeeChanged",
            Self::JoinPartAgentAdded { .. } => "JoinPartAgentAdded",
            Self::JoinPartAgentRemoved { .. } => "JoinPartAgentRemoved",
            Self::OwnershipTransferProposed { .. } => "OwnershipTransferProposed",
            Self::OwnershipTransferred { .. } => "OwnershipTransferred",
            Self::MetadataChanged { .. } => "MetadataChanged",
            Self::ModuleRegistered { .. } => "ModuleRegistered",
            Self::ModuleRemoved { .. } => "ModuleRemoved",
            Self::ModulesLocked => "ModulesLocked",
        }
    }
}

/// A journaled event with its position in the ledger's event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// Unix timestamp (seconds) of the operation that emitted the event.
    pub timestamp: u64,
    pub event: LedgerEvent,
}
