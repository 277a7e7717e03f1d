//! Withdrawal rate limits and minimum membership age.
//!
//! Periods are fixed windows (`now / period`), not a sliding window: a
//! member can withdraw up to the cap at the end of one period and again
//! at the start of the next.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dataunion_types::{Address, Amount};
use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::modules::{HookContext, LedgerModule, Veto};
use crate::token::Token;
use crate::{LedgerError, Result};

/// Limits enforced by [`RateLimitModule`]. Zero disables a limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// Minimum seconds since the last join before withdrawing or rejoining.
    pub required_member_age_seconds: u64,
    pub withdraw_limit_period_seconds: u64,
    /// Cap on the amount withdrawn per member per period.
    pub withdraw_limit_during_period: Amount,
    pub minimum_withdraw_amount: Amount,
}

#[derive(Default)]
struct RateState {
    limits: RateLimits,
    joined_at: HashMap<Address, u64>,
    /// Member -> (period index, amount withdrawn in that period).
    withdrawn: HashMap<Address, (u64, Amount)>,
}

impl RateState {
    fn period_index(&self, now: u64) -> Option<u64> {
        match self.limits.withdraw_limit_period_seconds {
            0 => None,
            period => Some(now / period),
        }
    }

    fn withdrawn_in_period(&self, member: &Address, now: u64) -> Amount {
        match (self.period_index(now), self.withdrawn.get(member)) {
            (Some(index), Some((recorded, amount))) if *recorded == index => *amount,
            _ => 0,
        }
    }

    fn too_young(&self, member: &Address, now: u64) -> bool {
        let age = self.limits.required_member_age_seconds;
        age > 0
            && self
                .joined_at
                .get(member)
                .is_some_and(|joined| now.saturating_sub(*joined) < age)
    }
}

pub struct RateLimitModule {
    state: Mutex<RateState>,
}

impl RateLimitModule {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            state: Mutex::new(RateState {
                limits,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limits(&self) -> RateLimits {
        self.state().limits
    }

    /// Owner-only; refused once modules are locked.
    pub fn set_limits<T: Token>(&self, ledger: &Ledger<T>, caller: &Address, limits: RateLimits) -> Result<()> {
        ledger.require_owner(caller)?;
        if ledger.modules_locked() {
            return Err(LedgerError::ModulesLocked);
        }
        self.state().limits = limits;
        tracing::info!(?limits, "rate limits changed");
        Ok(())
    }

    /// Amount `member` has withdrawn in the current period.
    pub fn withdrawn_in_period(&self, member: &Address, now: u64) -> Amount {
        self.state().withdrawn_in_period(member, now)
    }
}

impl LedgerModule for RateLimitModule {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn check_join(&self, ctx: &HookContext, member: &Address) -> Veto {
        if self.state().too_young(member, ctx.now) {
            return Err("rejoined before the required membership age".to_string());
        }
        Ok(())
    }

    fn on_join(&self, ctx: &HookContext, member: &Address) {
        self.state().joined_at.insert(*member, ctx.now);
    }

    fn check_withdraw(&self, ctx: &HookContext, member: &Address, _recipient: &Address, amount: Amount) -> Veto {
        let state = self.state();
        if state.too_young(member, ctx.now) {
            return Err("member too new to withdraw".to_string());
        }
        if amount < state.limits.minimum_withdraw_amount {
            return Err(format!(
                "amount {amount} below minimum {}",
                state.limits.minimum_withdraw_amount
            ));
        }
        let cap = state.limits.withdraw_limit_during_period;
        if cap > 0 && state.period_index(ctx.now).is_some() {
            let used = state.withdrawn_in_period(member, ctx.now);
            if used.saturating_add(amount) > cap {
                return Err(format!("withdraw limit {cap} for this period exceeded ({used} used)"));
            }
        }
        Ok(())
    }

    fn on_withdraw(&self, ctx: &HookContext, member: &Address, _recipient: &Address, amount: Amount) {
        let mut state = self.state();
        let Some(index) = state.period_index(ctx.now) else {
            return;
        };
        let used = state.withdrawn_in_period(member, ctx.now);
        state
            .withdrawn
            .insert(*member, (index, used.saturating_add(amount)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMBER: Address = Address::from_bytes([10u8; 32]);

    fn ctx(now: u64) -> HookContext {
        HookContext {
            ledger: Address::from_bytes([9u8; 32]),
            now,
        }
    }

    fn module() -> RateLimitModule {
        RateLimitModule::new(RateLimits {
            required_member_age_seconds: 100,
            withdraw_limit_period_seconds: 1_000,
            withdraw_limit_during_period: 500,
            minimum_withdraw_amount: 10,
        })
    }

    #[test]
    fn test_member_age() {
        let m = module();
        m.on_join(&ctx(1_000), &MEMBER);
        assert!(m.check_withdraw(&ctx(1_050), &MEMBER, &MEMBER, 50).is_err());
        assert!(m.check_join(&ctx(1_050), &MEMBER).is_err());
        assert!(m.check_withdraw(&ctx(1_100), &MEMBER, &MEMBER, 50).is_ok());
        assert!(m.check_join(&ctx(1_100), &MEMBER).is_ok());
    }

    #[test]
    fn test_minimum_amount() {
        let m = module();
        assert!(m.check_withdraw(&ctx(5_000), &MEMBER, &MEMBER, 9).is_err());
        assert!(m.check_withdraw(&ctx(5_000), &MEMBER, &MEMBER, 10).is_ok());
    }

    #[test]
    fn test_period_cap_resets_on_boundary() {
        let m = module();
        m.on_withdraw(&ctx(5_900), &MEMBER, &MEMBER, 400);
        assert_eq!(m.withdrawn_in_period(&MEMBER, 5_950), 400);
        assert!(m.check_withdraw(&ctx(5_950), &MEMBER, &MEMBER, 101).is_err());
        assert!(m.check_withdraw(&ctx(5_950), &MEMBER, &MEMBER, 100).is_ok());
        // next period starts at 6000
        assert_eq!(m.withdrawn_in_period(&MEMBER, 6_000), 0);
        assert!(m.check_withdraw(&ctx(6_000), &MEMBER, &MEMBER, 500).is_ok());
    }

    #[test]
    fn test_zero_limits_disable_checks() {
        let m = RateLimitModule::new(RateLimits::default());
        m.on_join(&ctx(0), &MEMBER);
        assert!(m.check_withdraw(&ctx(0), &MEMBER, &MEMBER, 1).is_ok());
        assert!(m.check_join(&ctx(0), &MEMBER).is_ok());
    }
}
