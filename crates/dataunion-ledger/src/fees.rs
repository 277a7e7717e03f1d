//! Capped admin/protocol fee policy.
//!
//! Fractions are fixed-point with [`FRACTION_ONE`] = 100%. The admin and
//! protocol fractions must each lie in `[0, 1]` and sum to at most 1.
//!
//! The protocol fraction is driven by an external oracle. When an oracle
//! increase would push the sum above 1, the admin fraction is clamped to
//! `1 - protocol` instead of failing, so protocol fee updates always land.

use dataunion_types::Amount;
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result};

/// Fixed-point representation of 1.0.
pub const FRACTION_ONE: u64 = 1_000_000_000_000_000_000;

/// One basis point in fixed-point units.
const BASIS_POINT: u64 = FRACTION_ONE / 10_000;

/// A fee fraction, `FRACTION_ONE` = 100%.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fraction(u64);

impl Fraction {
    pub const ZERO: Fraction = Fraction(0);
    pub const ONE: Fraction = Fraction(FRACTION_ONE);

    /// Wrap a raw fixed-point value. May be out of range; see [`Fraction::is_valid`].
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build from basis points (`900` = 9%).
    pub const fn from_bps(bps: u32) -> Self {
        Self(bps as u64 * BASIS_POINT)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Whether the fraction lies in `[0, 1]`.
    pub const fn is_valid(&self) -> bool {
        self.0 <= FRACTION_ONE
    }

    /// `1 - self`, saturating at zero.
    pub const fn complement(&self) -> Fraction {
        Fraction(FRACTION_ONE.saturating_sub(self.0))
    }

    /// `floor(amount * self)`.
    pub fn apply(&self, amount: Amount) -> Result<Amount> {
        let scaled = (amount as u128) * (self.0 as u128) / (FRACTION_ONE as u128);
        Amount::try_from(scaled).map_err(|_| LedgerError::Overflow)
    }
}

/// Result of splitting an incoming revenue amount.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeSplit {
    pub admin_fee: Amount,
    pub protocol_fee: Amount,
    pub member_share: Amount,
}

/// Outcome of applying an oracle-driven protocol fee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolFeeUpdate {
    /// The protocol fraction actually changed.
    pub protocol_changed: bool,
    /// The admin fraction was clamped to this value to keep the sum at most 1.
    pub admin_clamped_to: Option<Fraction>,
}

/// Admin and protocol fee fractions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    admin: Fraction,
    protocol: Fraction,
}

impl FeePolicy {
    /// Create a validated policy.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::FeeFractionOutOfRange`] if either fraction exceeds 1 or they sum above 1
    pub fn new(admin: Fraction, protocol: Fraction) -> Result<Self> {
        validate(admin, protocol)?;
        Ok(Self { admin, protocol })
    }

    pub fn admin_fee(&self) -> Fraction {
        self.admin
    }

    pub fn protocol_fee(&self) -> Fraction {
        self.protocol
    }

    /// Replace both fractions. Fails without changing anything when out of range.
    pub fn set_fees(&mut self, admin: Fraction, protocol: Fraction) -> Result<()> {
        validate(admin, protocol)?;
        self.admin = admin;
        self.protocol = protocol;
        Ok(())
    }

    /// Replace the admin fraction, keeping the current protocol fraction.
    pub fn set_admin_fee(&mut self, admin: Fraction) -> Result<()> {
        self.set_fees(admin, self.protocol)
    }

    /// Apply a protocol fraction reported by the fee oracle. Never fails:
    /// an out-of-range report is capped at 1 and the admin fraction is
    /// clamped to whatever room is left.
    pub fn apply_protocol_fee(&mut self, protocol: Fraction) -> ProtocolFeeUpdate {
        let protocol = protocol.min(Fraction::ONE);
        let mut update = ProtocolFeeUpdate {
            protocol_changed: protocol != self.protocol,
            admin_clamped_to: None,
        };
        self.protocol = protocol;

        let room = protocol.complement();
        if self.admin > room {
            tracing::warn!(
                admin = self.admin.raw(),
                protocol = protocol.raw(),
                "protocol fee increase clamps admin fee"
            );
            self.admin = room;
            update.admin_clamped_to = Some(room);
        }
        update
    }

    /// Split an incoming amount into admin fee, protocol fee and member share.
    ///
    /// Both fees are floored; the member share absorbs the rounding.
    pub fn split(&self, amount: Amount) -> Result<FeeSplit> {
        let admin_fee = self.admin.apply(amount)?;
        let protocol_fee = self.protocol.apply(amount)?;
        let member_share = amount
            .checked_sub(admin_fee)
            .and_then(|rest| rest.checked_sub(protocol_fee))
            .ok_or(LedgerError::Overflow)?;
        Ok(FeeSplit {
            admin_fee,
            protocol_fee,
            member_share,
        })
    }
}

fn validate(admin: Fraction, protocol: Fraction) -> Result<()> {
    let sum = admin.raw() as u128 + protocol.raw() as u128;
    if !admin.is_valid() || !protocol.is_valid() || sum > FRACTION_ONE as u128 {
        return Err(LedgerError::FeeFractionOutOfRange {
            admin: admin.raw(),
            protocol: protocol.raw(),
        });
    }
    Ok(())
}
