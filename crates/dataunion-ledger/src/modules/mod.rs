//! Extension modules.
//!
//! Modules observe and may veto membership and withdrawal operations.
//! The ledger calls `check_*` hooks while staging an operation (a veto
//! aborts the whole operation) and `on_*` hooks after it has committed,
//! in registration order.
//!
//! ## Modules
//!
//! - [`ban`] — Ban list with timed and permanent bans
//! - [`weight`] — Owner-configured per-member weights
//! - [`rate_limit`] — Membership age, minimum amount and per-period withdraw caps
//! - [`routing`] — Recipient to destination withdrawal redirects

pub mod ban;
pub mod rate_limit;
pub mod routing;
pub mod weight;

use std::sync::Arc;

use dataunion_types::events::ModuleSlot;
use dataunion_types::member::PartReason;
use dataunion_types::{Address, Amount, Weight};

use crate::{LedgerError, Result};

/// Context handed to every hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookContext {
    /// Identity of the ledger running the hook.
    pub ledger: Address,
    /// Current time, unix seconds.
    pub now: u64,
}

/// Outcome of a `check_*` hook: `Err(reason)` vetoes the operation.
pub type Veto = std::result::Result<(), String>;

/// A join, part or withdraw listener.
///
/// Every method has a no-op default, so a module implements only the
/// hooks it cares about.
pub trait LedgerModule: Send + Sync {
    /// Unique name within a slot.
    fn name(&self) -> &str;

    fn check_join(&self, _ctx: &HookContext, _member: &Address) -> Veto {
        Ok(())
    }

    /// Weight to give `member` on join, if this module decides it.
    fn join_weight(&self, _member: &Address) -> Option<Weight> {
        None
    }

    fn on_join(&self, _ctx: &HookContext, _member: &Address) {}

    fn check_part(&self, _ctx: &HookContext, _member: &Address, _reason: PartReason) -> Veto {
        Ok(())
    }

    fn on_part(&self, _ctx: &HookContext, _member: &Address, _reason: PartReason) {}

    fn check_withdraw(&self, _ctx: &HookContext, _member: &Address, _recipient: &Address, _amount: Amount) -> Veto {
        Ok(())
    }

    fn on_withdraw(&self, _ctx: &HookContext, _member: &Address, _recipient: &Address, _amount: Amount) {}
}

/// Replaces the default "pay the recipient" step of every withdrawal.
pub trait WithdrawRouter: Send + Sync {
    fn name(&self) -> &str;

    /// Final destination of the tokens.
    fn route(&self, ctx: &HookContext, member: &Address, recipient: &Address, amount: Amount) -> Address;

    /// Called after the tokens reached `destination`.
    fn on_routed(&self, _ctx: &HookContext, _member: &Address, _destination: &Address, _amount: Amount) {}
}

/// Listener registration lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerSlot {
    Join,
    Part,
    Withdraw,
}

impl ListenerSlot {
    pub fn module_slot(self) -> ModuleSlot {
        match self {
            ListenerSlot::Join => ModuleSlot::JoinListener,
            ListenerSlot::Part => ModuleSlot::PartListener,
            ListenerSlot::Withdraw => ModuleSlot::WithdrawListener,
        }
    }
}

/// Registered modules and the one-way lock.
#[derive(Default)]
pub struct ModuleRegistry {
    join_listeners: Vec<Arc<dyn LedgerModule>>,
    part_listeners: Vec<Arc<dyn LedgerModule>>,
    withdraw_listeners: Vec<Arc<dyn LedgerModule>>,
    router: Option<Arc<dyn WithdrawRouter>>,
    locked: bool,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn listeners(&self, slot: ListenerSlot) -> &[Arc<dyn LedgerModule>] {
        match slot {
            ListenerSlot::Join => &self.join_listeners,
            ListenerSlot::Part => &self.part_listeners,
            ListenerSlot::Withdraw => &self.withdraw_listeners,
        }
    }

    fn listeners_mut(&mut self, slot: ListenerSlot) -> &mut Vec<Arc<dyn LedgerModule>> {
        match slot {
            ListenerSlot::Join => &mut self.join_listeners,
            ListenerSlot::Part => &mut self.part_listeners,
            ListenerSlot::Withdraw => &mut self.withdraw_listeners,
        }
    }

    /// Names registered in `slot`, in call order.
    pub fn names(&self, slot: ListenerSlot) -> Vec<String> {
        self.listeners(slot).iter().map(|m| m.name().to_string()).collect()
    }

    pub fn router(&self) -> Option<&Arc<dyn WithdrawRouter>> {
        self.router.as_ref()
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(LedgerError::ModulesLocked);
        }
        Ok(())
    }

    /// Append `module` to a listener list.
    pub fn register(&mut self, slot: ListenerSlot, module: Arc<dyn LedgerModule>) -> Result<()> {
        self.ensure_unlocked()?;
        let list = self.listeners_mut(slot);
        if list.iter().any(|m| m.name() == module.name()) {
            return Err(LedgerError::ModuleAlreadyRegistered(module.name().to_string()));
        }
        list.push(module);
        Ok(())
    }

    pub fn remove(&mut self, slot: ListenerSlot, name: &str) -> Result<()> {
        self.ensure_unlocked()?;
        let list = self.listeners_mut(slot);
        let position = list
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| LedgerError::ModuleNotRegistered(name.to_string()))?;
        list.remove(position);
        Ok(())
    }

    /// Install or clear the router. Returns the name of the one replaced.
    pub fn set_router(&mut self, router: Option<Arc<dyn WithdrawRouter>>) -> Result<Option<String>> {
        self.ensure_unlocked()?;
        let previous = std::mem::replace(&mut self.router, router);
        Ok(previous.map(|r| r.name().to_string()))
    }

    /// Freeze every slot. Returns false if already locked.
    pub fn lock(&mut self) -> bool {
        !std::mem::replace(&mut self.locked, true)
    }

    pub fn check_join(&self, ctx: &HookContext, member: &Address) -> Result<()> {
        for module in &self.join_listeners {
            tracing::debug!(module = module.name(), %member, "check_join");
            module.check_join(ctx, member).map_err(|reason| veto(module.name(), reason))?;
        }
        Ok(())
    }

    /// First weight proposed by a join listener.
    pub fn join_weight(&self, member: &Address) -> Option<Weight> {
        self.join_listeners.iter().find_map(|m| m.join_weight(member))
    }

    pub fn notify_join(&self, ctx: &HookContext, member: &Address) {
        for module in &self.join_listeners {
            module.on_join(ctx, member);
        }
    }

    pub fn check_part(&self, ctx: &HookContext, member: &Address, reason: PartReason) -> Result<()> {
        for module in &self.part_listeners {
            tracing::debug!(module = module.name(), %member, "check_part");
            module
                .check_part(ctx, member, reason)
                .map_err(|r| veto(module.name(), r))?;
        }
        Ok(())
    }

    pub fn notify_part(&self, ctx: &HookContext, member: &Address, reason: PartReason) {
        for module in &self.part_listeners {
            module.on_part(ctx, member, reason);
        }
    }

    pub fn check_withdraw(&self, ctx: &HookContext, member: &Address, recipient: &Address, amount: Amount) -> Result<()> {
        for module in &self.withdraw_listeners {
            tracing::debug!(module = module.name(), %member, amount, "check_withdraw");
            module
                .check_withdraw(ctx, member, recipient, amount)
                .map_err(|r| veto(module.name(), r))?;
        }
        Ok(())
    }

    /// Destination for a withdrawal: the router's choice or `recipient`.
    pub fn route(&self, ctx: &HookContext, member: &Address, recipient: &Address, amount: Amount) -> Address {
        match &self.router {
            Some(router) => router.route(ctx, member, recipient, amount),
            None => *recipient,
        }
    }

    pub fn notify_withdraw(
        &self,
        ctx: &HookContext,
        member: &Address,
        recipient: &Address,
        destination: &Address,
        amount: Amount,
    ) {
        for module in &self.withdraw_listeners {
            module.on_withdraw(ctx, member, recipient, amount);
        }
        if let Some(router) = &self.router {
            router.on_routed(ctx, member, destination, amount);
        }
    }
}

fn veto(module: &str, reason: String) -> LedgerError {
    tracing::warn!(module, %reason, "module veto");
    LedgerError::ModuleVeto {
        module: module.to_string(),
        reason,
    }
}
