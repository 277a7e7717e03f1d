//! Member lifecycle types.

use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Weight};

/// Membership status of an address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Never joined and never credited.
    #[default]
    None,
    /// Participates in new revenue distributions.
    Active,
    /// Parted, banned, or a pseudo-member (fee beneficiary, in-contract recipient).
    Inactive,
}

/// Why a member was parted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartReason {
    /// The member parted itself.
    SelfRequest,
    /// A join-part agent or the owner removed the member.
    Agent,
    /// Removed by the ban module.
    Banned,
}

/// Read-only view of a member's earnings, as returned by `getMemberInfo`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub address: Address,
    pub status: MemberStatus,
    pub weight: Weight,
    /// Everything ever credited to the member, including pre-join credits.
    pub lifetime_earnings: Amount,
    pub withdrawn_earnings: Amount,
    /// `lifetime_earnings - withdrawn_earnings`.
    pub withdrawable: Amount,
}
