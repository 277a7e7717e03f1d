//! Ban list.
//!
//! Banning parts an active member (reason `Banned`) and blocks rejoining
//! until the ban expires or is lifted with [`BanModule::restore`], which
//! also re-adds members that were active when banned. The module acts on
//! the ledger under its own address, so that address must be a
//! join-part agent, and it must be registered as a join listener to
//! enforce the block.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use dataunion_types::member::PartReason;
use dataunion_types::Address;

use crate::ledger::Ledger;
use crate::modules::{HookContext, LedgerModule, Veto};
use crate::token::Token;
use crate::{LedgerError, Result};

/// Expiry value meaning "until restored".
pub const PERMANENT: u64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BanRecord {
    /// Unix seconds, or [`PERMANENT`].
    until: u64,
    was_active: bool,
}

impl BanRecord {
    fn in_force(&self, now: u64) -> bool {
        self.until == PERMANENT || now < self.until
    }
}

pub struct BanModule {
    address: Address,
    bans: Mutex<HashMap<Address, BanRecord>>,
}

impl BanModule {
    /// `address` is the agent identity the module acts under.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            bans: Mutex::new(HashMap::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn bans(&self) -> std::sync::MutexGuard<'_, HashMap<Address, BanRecord>> {
        self.bans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ban `member` until restored.
    pub fn ban<T: Token>(&self, ledger: &mut Ledger<T>, caller: &Address, member: &Address) -> Result<()> {
        self.ban_until(ledger, caller, member, PERMANENT)
    }

    /// Ban `member` for `seconds` from now.
    pub fn ban_seconds<T: Token>(
        &self,
        ledger: &mut Ledger<T>,
        caller: &Address,
        member: &Address,
        seconds: u64,
    ) -> Result<()> {
        if seconds == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let until = ledger.now().checked_add(seconds).ok_or(LedgerError::Overflow)?;
        self.ban_until(ledger, caller, member, until)
    }

    fn ban_until<T: Token>(&self, ledger: &mut Ledger<T>, caller: &Address, member: &Address, until: u64) -> Result<()> {
        ledger.require_join_controller(caller)?;
        if member.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        let active = ledger.is_active_member(member);
        if active {
            ledger.part_with_reason(&self.address, &[*member], PartReason::Banned)?;
        }
        let mut bans = self.bans();
        let was_active = active || bans.get(member).is_some_and(|r| r.was_active);
        bans.insert(*member, BanRecord { until, was_active });
        tracing::info!(%member, until, was_active, "member banned");
        Ok(())
    }

    /// Lift the ban on `member`, re-adding it if it was active when banned.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotBanned`] if there is no ban record
    pub fn restore<T: Token>(&self, ledger: &mut Ledger<T>, caller: &Address, member: &Address) -> Result<()> {
        ledger.require_join_controller(caller)?;
        let record = self
            .bans()
            .remove(member)
            .ok_or(LedgerError::NotBanned(*member))?;
        if record.was_active && !ledger.is_active_member(member) {
            if let Err(e) = ledger.add_member(&self.address, *member) {
                self.bans().insert(*member, record);
                return Err(e);
            }
        }
        tracing::info!(%member, rejoined = record.was_active, "member restored");
        Ok(())
    }

    pub fn is_banned<T: Token>(&self, ledger: &Ledger<T>, member: &Address) -> bool {
        let now = ledger.now();
        self.bans().get(member).is_some_and(|r| r.in_force(now))
    }

    /// Expiry of the ban on `member`: `Some(0)` for permanent, `None` if not banned.
    pub fn banned_until(&self, member: &Address) -> Option<u64> {
        self.bans().get(member).map(|r| r.until)
    }
}

impl LedgerModule for BanModule {
    fn name(&self) -> &str {
        "ban"
    }

    fn check_join(&self, ctx: &HookContext, member: &Address) -> Veto {
        match self.bans().get(member) {
            Some(record) if record.in_force(ctx.now) => Err(format!("{member} is banned")),
            _ => Ok(()),
        }
    }

    fn on_join(&self, ctx: &HookContext, member: &Address) {
        let mut bans = self.bans();
        if bans.get(member).is_some_and(|r| !r.in_force(ctx.now)) {
            bans.remove(member);
        }
    }
}
