//! Owner-configured member weights.
//!
//! Registered as a join listener, the module supplies each member's
//! weight at join time. Changes for members that are already active are
//! applied through the ledger under the module's agent address.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use dataunion_types::{Address, Weight, DEFAULT_WEIGHT};

use crate::ledger::Ledger;
use crate::modules::LedgerModule;
use crate::token::Token;
use crate::{LedgerError, Result};

pub struct WeightModule {
    address: Address,
    weights: Mutex<HashMap<Address, Weight>>,
}

impl WeightModule {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            weights: Mutex::new(HashMap::new()),
        }
    }

    /// Owner-only. Active members are re-weighted immediately.
    pub fn set_weight<T: Token>(
        &self,
        ledger: &mut Ledger<T>,
        caller: &Address,
        member: &Address,
        weight: Weight,
    ) -> Result<()> {
        ledger.require_owner(caller)?;
        if weight == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if ledger.is_active_member(member) {
            ledger.set_member_weight(&self.address, *member, weight)?;
        }
        self.weights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*member, weight);
        Ok(())
    }

    /// Configured weight, or [`DEFAULT_WEIGHT`].
    pub fn weight_of(&self, member: &Address) -> Weight {
        self.weights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(member)
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

impl LedgerModule for WeightModule {
    fn name(&self) -> &str {
        "weight"
    }

    fn join_weight(&self, member: &Address) -> Option<Weight> {
        self.weights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(member)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fees::Fraction;
    use crate::ledger::LedgerConfig;
    use crate::modules::ListenerSlot;
    use crate::oracle::FixedFeeOracle;
    use crate::token::InMemoryToken;
    use std::sync::Arc;

    const OWNER: Address = Address::from_bytes([1u8; 32]);
    const WEIGHT_AGENT: Address = Address::from_bytes([2u8; 32]);
    const PAYER: Address = Address::from_bytes([4u8; 32]);

    #[test]
    fn test_weights_at_join_and_while_active() {
        let oracle = Arc::new(FixedFeeOracle::new(Fraction::ZERO, Address::from_bytes([3u8; 32])));
        let token = InMemoryToken::with_balances([(PAYER, 10_000)]);
        let mut ledger = Ledger::new(Address::from_bytes([9u8; 32]), token, oracle, Arc::new(ManualClock::new(0)));
        ledger
            .initialize(LedgerConfig {
                owner: OWNER,
                join_part_agents: vec![WEIGHT_AGENT],
                ..Default::default()
            })
            .expect("initialize");
        let weights = Arc::new(WeightModule::new(WEIGHT_AGENT));
        ledger
            .register_module(&OWNER, ListenerSlot::Join, weights.clone())
            .expect("register");

        let a = Address::from_bytes([10u8; 32]);
        let b = Address::from_bytes([11u8; 32]);
        weights.set_weight(&mut ledger, &OWNER, &a, 3).expect("configure");
        assert_eq!(weights.weight_of(&b), DEFAULT_WEIGHT);

        ledger.add_members(&OWNER, &[a, b]).expect("join");
        assert_eq!(ledger.get_stats().total_active_weight, 4);
        ledger.pay_revenue(&PAYER, 400).expect("pay");
        assert_eq!(ledger.get_earnings(&a).expect("a"), 300);
        assert_eq!(ledger.get_earnings(&b).expect("b"), 100);

        weights.set_weight(&mut ledger, &OWNER, &b, 3).expect("reweight");
        assert_eq!(ledger.get_stats().total_active_weight, 6);
        ledger.pay_revenue(&PAYER, 600).expect("pay");
        assert_eq!(ledger.get_earnings(&b).expect("b"), 400);

        assert_eq!(
            weights.set_weight(&mut ledger, &WEIGHT_AGENT, &b, 1),
            Err(LedgerError::NotOwner { caller: WEIGHT_AGENT })
        );
    }
}
