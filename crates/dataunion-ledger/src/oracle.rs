//! Protocol fee oracle collaborator.

use std::sync::atomic::{AtomicU64, Ordering};

use dataunion_types::Address;

use crate::fees::Fraction;

/// Source of the protocol fee fraction and its beneficiary.
pub trait FeeOracle: Send + Sync {
    /// Current protocol fee fraction.
    fn protocol_fee(&self) -> Fraction;

    /// Account credited with protocol fees.
    fn beneficiary(&self) -> Address;
}

/// Oracle reporting a configurable fee. The fee can be changed at runtime
/// through a shared reference, which is how protocol-side updates arrive.
#[derive(Debug)]
pub struct FixedFeeOracle {
    fee: AtomicU64,
    beneficiary: Address,
}

impl FixedFeeOracle {
    pub fn new(fee: Fraction, beneficiary: Address) -> Self {
        Self {
            fee: AtomicU64::new(fee.raw()),
            beneficiary,
        }
    }

    /// Report a new protocol fee. Picked up at the ledger's next refresh.
    pub fn set_protocol_fee(&self, fee: Fraction) {
        self.fee.store(fee.raw(), Ordering::SeqCst);
    }
}

impl FeeOracle for FixedFeeOracle {
    fn protocol_fee(&self) -> Fraction {
        Fraction::from_raw(self.fee.load(Ordering::SeqCst))
    }

    fn beneficiary(&self) -> Address {
        self.beneficiary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_oracle_update() {
        let oracle = FixedFeeOracle::new(Fraction::from_bps(100), Address::from_bytes([5u8; 32]));
        assert_eq!(oracle.protocol_fee(), Fraction::from_bps(100));
        oracle.set_protocol_fee(Fraction::from_bps(250));
        assert_eq!(oracle.protocol_fee(), Fraction::from_bps(250));
        assert_eq!(oracle.beneficiary(), Address::from_bytes([5u8; 32]));
    }
}
