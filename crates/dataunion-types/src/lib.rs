//! # dataunion-types
//!
//! Shared domain types used across the Data Union workspace: addresses,
//! amounts, member views, aggregate statistics and ledger events.

pub mod events;
pub mod member;
pub mod stats;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

/// Token amount in base units.
pub type Amount = u64;

/// Per-member distribution weight. New members default to [`DEFAULT_WEIGHT`].
pub type Weight = u64;

/// Weight assigned to a member that joins without an explicit weight.
pub const DEFAULT_WEIGHT: Weight = 1;

/// Length of an address in bytes (an Ed25519 verifying key).
pub const ADDRESS_LEN: usize = 32;

/// Errors produced while parsing shared types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    /// The string was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded bytes had the wrong length.
    #[error("invalid address length: expected {ADDRESS_LEN}, got {0}")]
    InvalidLength(usize),
}

/// A ledger participant: member, agent, owner, payer or the ledger itself.
///
/// The bytes are the participant's Ed25519 verifying key, so a withdrawal
/// signature can be checked directly against the member's address.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(#[serde_as(as = "serde_with::hex::Hex")] [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address. Never a valid participant.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Lowercase hex encoding without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; ADDRESS_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps tracing output readable.
        write!(f, "Address({}…)", &self.to_hex()[..8])
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::from_bytes([0xab; 32]);
        let parsed: Address = addr.to_hex().parse().expect("parse");
        assert_eq!(parsed, addr);

        let prefixed: Address = format!("0x{addr}").parse().expect("parse prefixed");
        assert_eq!(prefixed, addr);
    }

    #[test]
    fn test_address_bad_length() {
        let result = "abcd".parse::<Address>();
        assert_eq!(result, Err(TypeError::InvalidLength(2)));
    }

    #[test]
    fn test_address_bad_hex() {
        assert!(matches!(
            "zz".repeat(32).parse::<Address>(),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_address_serde_is_hex_string() {
        let addr = Address::from_bytes([1u8; 32]);
        let json = serde_json::to_string(&addr).expect("serialize");
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Address = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, addr);
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_bytes([7u8; 32]).is_zero());
    }
}
