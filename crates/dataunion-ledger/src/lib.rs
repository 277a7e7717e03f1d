//! # dataunion-ledger
//!
//! Revenue-sharing ledger for a Data Union: a shared pool that receives
//! token payments and splits them pro-rata among a churning member set,
//! net of an administrator fee and a protocol fee.
//!
//! Revenue events cost O(1) regardless of member count: the ledger keeps a
//! cumulative per-weight earnings index and each member snapshots it at
//! join, part and weight-change time.
//!
//! ## Modules
//!
//! - [`fees`] — Capped admin/protocol fee fractions
//! - [`registry`] — Member lifecycle records and counters
//! - [`accounting`] — Per-weight earnings index and aggregate totals
//! - [`roles`] — Owner (two-step transfer) and join-part agents
//! - [`withdraw`] — Withdrawal authorization messages and signature checks
//! - [`modules`] — Extension hooks: ban list, weights, rate limits, routing
//! - [`ledger`] — The facade composing all of the above
//! - [`token`], [`oracle`], [`clock`] — External collaborators

pub mod accounting;
pub mod clock;
pub mod fees;
pub mod ledger;
pub mod modules;
pub mod oracle;
pub mod registry;
pub mod roles;
pub mod token;
pub mod withdraw;

pub use ledger::Ledger;

use dataunion_types::{Address, Amount};

use crate::token::TokenError;

/// Coarse error category, for callers deciding how to react.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing owner or agent capability.
    Authorization,
    /// Operation not valid in the current lifecycle state.
    State,
    /// Malformed argument.
    Value,
    /// Withdrawal signature rejected.
    Signature,
    /// Not enough withdrawable earnings or tokens.
    InsufficientFunds,
    /// An extension module vetoed the operation.
    Module,
}

/// Error types for ledger operations.
///
/// Every mutating operation either fully succeeds or returns one of these
/// with no state change.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    // Authorization
    #[error("{caller} is not the owner")]
    NotOwner { caller: Address },

    #[error("{caller} is not a join-part agent")]
    NotJoinPartAgent { caller: Address },

    #[error("{caller} may not withdraw for {member}")]
    NotPermitted { caller: Address, member: Address },

    #[error("{caller} is not the pending owner")]
    NotPendingOwner { caller: Address },

    // State
    #[error("ledger already initialized")]
    AlreadyInitialized,

    #[error("ledger not initialized")]
    NotInitialized,

    #[error("{0} is already an active member")]
    AlreadyActiveMember(Address),

    #[error("{0} is not an active member")]
    NotActiveMember(Address),

    #[error("{0} is not a member")]
    NotMember(Address),

    #[error("{0} is already a join-part agent")]
    AgentAlreadyExists(Address),

    #[error("{0} is not a join-part agent")]
    AgentNotFound(Address),

    #[error("{0} is not banned")]
    NotBanned(Address),

    #[error("modules are locked")]
    ModulesLocked,

    #[error("module {0} is already registered in this slot")]
    ModuleAlreadyRegistered(String),

    #[error("module {0} is not registered in this slot")]
    ModuleNotRegistered(String),

    // Value
    #[error("invalid address")]
    InvalidAddress,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("fee fractions out of range: admin {admin}, protocol {protocol} (1.0 = 10^18)")]
    FeeFractionOutOfRange { admin: u64, protocol: u64 },

    #[error("{0} appears more than once in the batch")]
    DuplicateAddress(Address),

    #[error("arithmetic overflow in ledger accounting")]
    Overflow,

    // Signature
    #[error("bad signature for {signer} (current withdrawn earnings {withdrawn_earnings})")]
    BadSignature {
        signer: Address,
        withdrawn_earnings: Amount,
    },

    #[error("bad signature length: {len}")]
    BadSignatureLength { len: usize },

    #[error("bad signature version: {version}")]
    BadSignatureVersion { version: u8 },

    // Insufficient funds
    #[error("{member} requested {requested} but only {available} is withdrawable")]
    InsufficientWithdrawable {
        member: Address,
        requested: Amount,
        available: Amount,
    },

    #[error("token transfer failed: {0}")]
    Transfer(#[from] TokenError),

    // Module
    #[error("module {module} vetoed: {reason}")]
    ModuleVeto { module: String, reason: String },
}

impl LedgerError {
    /// Map the error onto its category.
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            NotOwner { .. } | NotJoinPartAgent { .. } | NotPermitted { .. } | NotPendingOwner { .. } => {
                ErrorKind::Authorization
            }
            AlreadyInitialized
            | NotInitialized
            | AlreadyActiveMember(_)
            | NotActiveMember(_)
            | NotMember(_)
            | AgentAlreadyExists(_)
            | AgentNotFound(_)
            | NotBanned(_)
            | ModulesLocked
            | ModuleAlreadyRegistered(_)
            | ModuleNotRegistered(_) => ErrorKind::State,
            InvalidAddress
            | InvalidAmount
            | FeeFractionOutOfRange { .. }
            | DuplicateAddress(_)
            | Overflow => ErrorKind::Value,
            BadSignature { .. } | BadSignatureLength { .. } | BadSignatureVersion { .. } => {
                ErrorKind::Signature
            }
            InsufficientWithdrawable { .. } | Transfer(_) => ErrorKind::InsufficientFunds,
            ModuleVeto { .. } => ErrorKind::Module,
        }
    }
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let addr = Address::from_bytes([3u8; 32]);
        assert_eq!(LedgerError::NotOwner { caller: addr }.kind(), ErrorKind::Authorization);
        assert_eq!(LedgerError::AlreadyActiveMember(addr).kind(), ErrorKind::State);
        assert_eq!(
            LedgerError::FeeFractionOutOfRange { admin: 1, protocol: 2 }.kind(),
            ErrorKind::Value
        );
        assert_eq!(LedgerError::BadSignatureLength { len: 64 }.kind(), ErrorKind::Signature);
        assert_eq!(
            LedgerError::Transfer(TokenError::Rejected("paused".into())).kind(),
            ErrorKind::InsufficientFunds
        );
    }

    #[test]
    fn test_bad_signature_carries_nonce() {
        let err = LedgerError::BadSignature {
            signer: Address::from_bytes([9u8; 32]),
            withdrawn_earnings: 450,
        };
        assert!(err.to_string().contains("450"));
    }
}
