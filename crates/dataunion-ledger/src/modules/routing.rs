//! Withdrawal routing: owner-configured recipient to destination redirects,
//! e.g. sending a custodial member's withdrawals to a custody account.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dataunion_types::{Address, Amount};

use crate::ledger::Ledger;
use crate::modules::{HookContext, WithdrawRouter};
use crate::token::Token;
use crate::{LedgerError, Result};

#[derive(Default)]
pub struct RoutingWithdrawModule {
    routes: Mutex<HashMap<Address, Address>>,
}

impl RoutingWithdrawModule {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<Address, Address>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owner-only. `None` removes the route.
    pub fn set_route<T: Token>(
        &self,
        ledger: &Ledger<T>,
        caller: &Address,
        recipient: Address,
        destination: Option<Address>,
    ) -> Result<()> {
        ledger.require_owner(caller)?;
        if ledger.modules_locked() {
            return Err(LedgerError::ModulesLocked);
        }
        match destination {
            Some(destination) if destination.is_zero() => return Err(LedgerError::InvalidAddress),
            Some(destination) => {
                self.routes().insert(recipient, destination);
                tracing::info!(%recipient, %destination, "withdraw route set");
            }
            None => {
                self.routes().remove(&recipient);
                tracing::info!(%recipient, "withdraw route removed");
            }
        }
        Ok(())
    }

    pub fn route_for(&self, recipient: &Address) -> Option<Address> {
        self.routes().get(recipient).copied()
    }
}

impl WithdrawRouter for RoutingWithdrawModule {
    fn name(&self) -> &str {
        "routing"
    }

    fn route(&self, _ctx: &HookContext, _member: &Address, recipient: &Address, _amount: Amount) -> Address {
        self.route_for(recipient).unwrap_or(*recipient)
    }

    fn on_routed(&self, _ctx: &HookContext, member: &Address, destination: &Address, amount: Amount) {
        tracing::debug!(%member, %destination, amount, "withdrawal routed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fees::Fraction;
    use crate::ledger::LedgerConfig;
    use crate::oracle::FixedFeeOracle;
    use crate::token::InMemoryToken;
    use std::sync::Arc;

    const OWNER: Address = Address::from_bytes([1u8; 32]);
    const PAYER: Address = Address::from_bytes([4u8; 32]);
    const MEMBER: Address = Address::from_bytes([10u8; 32]);
    const CUSTODY: Address = Address::from_bytes([20u8; 32]);

    #[test]
    fn test_routed_withdrawal() {
        let oracle = Arc::new(FixedFeeOracle::new(Fraction::ZERO, Address::from_bytes([3u8; 32])));
        let token = InMemoryToken::with_balances([(PAYER, 1_000)]);
        let mut ledger = Ledger::new(Address::from_bytes([9u8; 32]), token, oracle, Arc::new(ManualClock::new(0)));
        ledger
            .initialize(LedgerConfig {
                owner: OWNER,
                ..Default::default()
            })
            .expect("initialize");
        let router = Arc::new(RoutingWithdrawModule::new());
        ledger
            .set_withdraw_router(&OWNER, Some(router.clone() as Arc<dyn WithdrawRouter>))
            .expect("install");
        router
            .set_route(&ledger, &OWNER, MEMBER, Some(CUSTODY))
            .expect("route");

        ledger.add_member(&OWNER, MEMBER).expect("join");
        ledger.pay_revenue(&PAYER, 1_000).expect("pay");
        ledger.withdraw_all(&MEMBER, &MEMBER).expect("withdraw");

        assert_eq!(ledger.token().balance_of(&CUSTODY), 1_000);
        assert_eq!(ledger.token().balance_of(&MEMBER), 0);
        let events = ledger.take_events();
        assert!(events.contains(&dataunion_types::events::LedgerEvent::EarningsWithdrawn {
            member: MEMBER,
            recipient: CUSTODY,
            amount: 1_000,
        }));
    }

    #[test]
    fn test_set_route_rules() {
        let oracle = Arc::new(FixedFeeOracle::new(Fraction::ZERO, Address::from_bytes([3u8; 32])));
        let mut ledger = Ledger::new(
            Address::from_bytes([9u8; 32]),
            InMemoryToken::new(),
            oracle,
            Arc::new(ManualClock::new(0)),
        );
        ledger
            .initialize(LedgerConfig {
                owner: OWNER,
                ..Default::default()
            })
            .expect("initialize");
        let router = RoutingWithdrawModule::new();
        assert_eq!(
            router.set_route(&ledger, &MEMBER, MEMBER, Some(CUSTODY)),
            Err(LedgerError::NotOwner { caller: MEMBER })
        );
        assert_eq!(
            router.set_route(&ledger, &OWNER, MEMBER, Some(Address::ZERO)),
            Err(LedgerError::InvalidAddress)
        );
        ledger.lock_modules(&OWNER).expect("lock");
        assert_eq!(
            router.set_route(&ledger, &OWNER, MEMBER, Some(CUSTODY)),
            Err(LedgerError::ModulesLocked)
        );
    }
}
