//! Ledger facade.
//!
//! [`Ledger`] composes the fee policy, member registry, revenue
//! accounting, roles and extension modules, and owns the token
//! collaborator. Every mutating operation follows the same shape:
//!
//! 1. authorize the caller and validate arguments
//! 2. stage every state change (and module check) against a copy of the
//!    aggregate state and a [`Changeset`] of member records
//! 3. move tokens, if the operation moves any
//! 4. commit the staged state and events, then run `on_*` module hooks
//!
//! A failure in steps 1-3 leaves the ledger untouched and emits nothing.
//! Operations take `&mut self`, so the owner of a `Ledger` decides how
//! calls are serialized (the daemon runs one actor task per ledger).

use std::sync::Arc;

use dataunion_types::events::LedgerEvent;
use dataunion_types::member::{MemberInfo, MemberStatus, PartReason};
use dataunion_types::stats::Stats;
use dataunion_types::{Address, Amount, Weight, DEFAULT_WEIGHT};

use crate::accounting::RevenueAccounting;
use crate::clock::Clock;
use crate::fees::{FeePolicy, Fraction};
use crate::modules::{HookContext, LedgerModule, ListenerSlot, ModuleRegistry, WithdrawRouter};
use crate::oracle::FeeOracle;
use crate::registry::{Changeset, MemberRecord, MemberRegistry};
use crate::roles::Roles;
use crate::token::Token;
use crate::withdraw::{verify_authorization, WithdrawalAuthorization, WithdrawalStep, UNLIMITED};
use crate::{LedgerError, Result};

/// Parameters for [`Ledger::initialize`].
#[derive(Clone, Debug, Default)]
pub struct LedgerConfig {
    pub owner: Address,
    pub admin_fee: Fraction,
    pub join_part_agents: Vec<Address>,
    pub metadata: String,
}

/// Aggregate state plus member changes of an operation in progress.
struct Staged<'a> {
    accounting: RevenueAccounting,
    fees: FeePolicy,
    members: Changeset<'a>,
    events: Vec<LedgerEvent>,
}

impl Staged<'_> {
    fn index(&self) -> Amount {
        self.accounting.earnings_index
    }

    fn finish(self) -> Result<Commit> {
        Ok(Commit {
            accounting: self.accounting,
            fees: self.fees,
            changes: self.members.into_changes()?,
            events: self.events,
        })
    }
}

/// A fully validated operation, ready to be applied.
struct Commit {
    accounting: RevenueAccounting,
    fees: FeePolicy,
    changes: Vec<(Address, MemberRecord)>,
    events: Vec<LedgerEvent>,
}

/// One requested withdrawal. `amount: None` means "everything withdrawable".
struct WithdrawRequest {
    member: Address,
    recipient: Address,
    amount: Option<Amount>,
}

/// A Data Union revenue-sharing ledger.
pub struct Ledger<T: Token> {
    identity: Address,
    initialized: bool,
    roles: Roles,
    fees: FeePolicy,
    accounting: RevenueAccounting,
    members: MemberRegistry,
    modules: ModuleRegistry,
    metadata: String,
    token: T,
    oracle: Arc<dyn FeeOracle>,
    clock: Arc<dyn Clock>,
    events: Vec<LedgerEvent>,
}

impl<T: Token> Ledger<T> {
    /// Create an uninitialized ledger holding its funds in `identity`'s
    /// token account.
    pub fn new(identity: Address, token: T, oracle: Arc<dyn FeeOracle>, clock: Arc<dyn Clock>) -> Self {
        Self {
            identity,
            initialized: false,
            roles: Roles::default(),
            fees: FeePolicy::default(),
            accounting: RevenueAccounting::default(),
            members: MemberRegistry::new(),
            modules: ModuleRegistry::new(),
            metadata: String::new(),
            token,
            oracle,
            clock,
            events: Vec::new(),
        }
    }

    /// Set owner, admin fee, initial agents and metadata. Callable once.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyInitialized`] on a second call
    /// - [`LedgerError::InvalidAddress`] if the owner or an agent is zero
    /// - [`LedgerError::FeeFractionOutOfRange`] if the admin fee does not fit next to the oracle's protocol fee
    pub fn initialize(&mut self, config: LedgerConfig) -> Result<()> {
        if self.initialized {
            return Err(LedgerError::AlreadyInitialized);
        }
        if config.owner.is_zero() || self.identity.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        let fees = FeePolicy::new(config.admin_fee, self.oracle.protocol_fee())?;
        let mut roles = Roles::new(config.owner);
        for agent in &config.join_part_agents {
            roles.add_agent(*agent)?;
        }

        let mut events = vec![
            LedgerEvent::OwnershipTransferred {
                previous_owner: Address::ZERO,
                new_owner: config.owner,
            },
            LedgerEvent::ProtocolFeeChanged {
                fraction: fees.protocol_fee().raw(),
            },
            LedgerEvent::AdminFeeChanged {
                fraction: fees.admin_fee().raw(),
            },
        ];
        events.extend(
            config
                .join_part_agents
                .iter()
                .map(|agent| LedgerEvent::JoinPartAgentAdded { agent: *agent }),
        );
        if !config.metadata.is_empty() {
            events.push(LedgerEvent::MetadataChanged {
                metadata: config.metadata.clone(),
            });
        }

        self.roles = roles;
        self.fees = fees;
        self.metadata = config.metadata;
        self.initialized = true;
        self.events.extend(events);
        tracing::info!(
            ledger = %self.identity,
            owner = %config.owner,
            admin_fee = fees.admin_fee().raw(),
            protocol_fee = fees.protocol_fee().raw(),
            "ledger initialized"
        );
        Ok(())
    }

    // ---- staging helpers ----

    fn require_initialized(&self) -> Result<()> {
        if !self.initialized {
            return Err(LedgerError::NotInitialized);
        }
        Ok(())
    }

    fn hook_context(&self) -> HookContext {
        HookContext {
            ledger: self.identity,
            now: self.clock.now(),
        }
    }

    fn begin(&self) -> Staged<'_> {
        Staged {
            accounting: self.accounting,
            fees: self.fees,
            members: self.members.changeset(),
            events: Vec::new(),
        }
    }

    fn apply(&mut self, commit: Commit) {
        self.accounting = commit.accounting;
        self.fees = commit.fees;
        self.members.apply(commit.changes);
        self.events.extend(commit.events);
    }

    /// Pick up the oracle's protocol fee, clamping the admin fee if needed.
    fn stage_protocol_fee(&self, tx: &mut Staged<'_>) {
        let update = tx.fees.apply_protocol_fee(self.oracle.protocol_fee());
        if update.protocol_changed {
            tx.events.push(LedgerEvent::ProtocolFeeChanged {
                fraction: tx.fees.protocol_fee().raw(),
            });
        }
        if let Some(admin) = update.admin_clamped_to {
            tx.events.push(LedgerEvent::AdminFeeChanged { fraction: admin.raw() });
        }
    }

    /// Recognize unaccounted balance (plus `incoming`, tokens about to
    /// arrive) as revenue and distribute it. Returns the new revenue.
    fn stage_refresh(&self, tx: &mut Staged<'_>, incoming: Amount) -> Result<Amount> {
        self.stage_protocol_fee(tx);

        let held = self
            .token
            .balance_of(&self.identity)
            .checked_add(incoming)
            .ok_or(LedgerError::Overflow)?;
        let revenue = tx.accounting.unaccounted(held);
        let weight = tx.members.active_weight()?;
        let sweep = weight > 0 && tx.accounting.undistributed >= weight;
        if revenue == 0 && !sweep {
            return Ok(0);
        }

        let (next, dist) = tx
            .accounting
            .distribute(revenue, &tx.fees, weight, self.members.active_count())?;
        tx.accounting = next;

        let index = next.earnings_index;
        if dist.fees.admin_fee > 0 {
            tx.members.credit(&self.roles.owner(), dist.fees.admin_fee, index)?;
        }
        if dist.fees.protocol_fee > 0 {
            tx.members
                .credit(&self.oracle.beneficiary(), dist.fees.protocol_fee, index)?;
        }
        if revenue > 0 {
            tx.events.push(LedgerEvent::RevenueReceived { amount: revenue });
            tx.events.push(LedgerEvent::FeesCharged {
                admin_fee: dist.fees.admin_fee,
                protocol_fee: dist.fees.protocol_fee,
            });
        }
        tracing::debug!(
            revenue,
            distributed = dist.distributed,
            index_increment = dist.index_increment,
            undistributed = next.undistributed,
            "revenue staged"
        );
        Ok(revenue)
    }

    // ---- revenue ----

    /// Recognize tokens that arrived since the last refresh and distribute
    /// them to active members, net of fees. Callable by anyone.
    ///
    /// A refresh with nothing new to recognize or distribute changes
    /// nothing and emits no event.
    pub fn refresh_revenue(&mut self) -> Result<Amount> {
        self.require_initialized()?;
        let mut tx = self.begin();
        let revenue = self.stage_refresh(&mut tx, 0)?;
        let commit = tx.finish()?;
        self.apply(commit);
        if revenue > 0 {
            tracing::info!(revenue, index = self.accounting.earnings_index, "revenue received");
        }
        Ok(revenue)
    }

    /// Pull `amount` from `payer` into the ledger and distribute it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAddress`] if `payer` is the ledger itself;
    ///   its own tokens are already accounted for
    pub fn pay_revenue(&mut self, payer: &Address, amount: Amount) -> Result<Amount> {
        self.require_initialized()?;
        self.require_external_payer(payer)?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut tx = self.begin();
        let revenue = self.stage_refresh(&mut tx, amount)?;
        let commit = tx.finish()?;
        self.token.transfer(payer, &self.identity, amount)?;
        self.apply(commit);
        tracing::info!(%payer, amount, revenue, "revenue paid");
        Ok(revenue)
    }

    /// Pull `amount` from `payer` and credit it to `member` directly,
    /// without fees. Unknown members become inactive pseudo-members.
    pub fn transfer_to_member_in_contract(&mut self, payer: &Address, member: &Address, amount: Amount) -> Result<()> {
        self.require_initialized()?;
        self.require_external_payer(payer)?;
        if member.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut tx = self.begin();
        tx.accounting = tx.accounting.with_direct_credit(amount)?;
        let index = tx.index();
        tx.members.credit(member, amount, index)?;
        tx.events.push(LedgerEvent::TransferToAddressInContract {
            from: *payer,
            to: *member,
            amount,
        });
        let commit = tx.finish()?;
        self.token.transfer(payer, &self.identity, amount)?;
        self.apply(commit);
        tracing::info!(%payer, %member, amount, "credited member in contract");
        Ok(())
    }

    /// Move `amount` of `sender`'s withdrawable earnings to `recipient`
    /// inside the ledger. No tokens move. The sender's withdrawn earnings
    /// grow, which stales their outstanding withdrawal signatures.
    pub fn transfer_within_contract(&mut self, sender: &Address, recipient: &Address, amount: Amount) -> Result<()> {
        self.require_initialized()?;
        if recipient.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut tx = self.begin();
        let index = tx.index();
        tx.members.spend(sender, amount, index)?;
        tx.members.credit(recipient, amount, index)?;
        tx.events.push(LedgerEvent::TransferWithinContract {
            from: *sender,
            to: *recipient,
            amount,
        });
        let commit = tx.finish()?;
        self.apply(commit);
        tracing::info!(%sender, %recipient, amount, "transfer within contract");
        Ok(())
    }

    // ---- membership ----

    pub fn add_member(&mut self, caller: &Address, member: Address) -> Result<()> {
        self.join_batch(caller, &[(member, None)])
    }

    pub fn add_member_with_weight(&mut self, caller: &Address, member: Address, weight: Weight) -> Result<()> {
        self.join_batch(caller, &[(member, Some(weight))])
    }

    /// Join every address, or none of them.
    pub fn add_members(&mut self, caller: &Address, members: &[Address]) -> Result<()> {
        let entries: Vec<_> = members.iter().map(|m| (*m, None)).collect();
        self.join_batch(caller, &entries)
    }

    pub fn add_members_with_weights(&mut self, caller: &Address, members: &[(Address, Weight)]) -> Result<()> {
        let entries: Vec<_> = members.iter().map(|(m, w)| (*m, Some(*w))).collect();
        self.join_batch(caller, &entries)
    }

    fn join_batch(&mut self, caller: &Address, entries: &[(Address, Option<Weight>)]) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_join_controller(caller)?;
        if entries.iter().any(|(m, _)| m.is_zero()) {
            return Err(LedgerError::InvalidAddress);
        }

        let ctx = self.hook_context();
        let mut tx = self.begin();
        // Revenue that arrived before these joins belongs to current members.
        self.stage_refresh(&mut tx, 0)?;
        let index = tx.index();
        for (member, weight) in entries {
            self.modules.check_join(&ctx, member)?;
            let weight = match weight {
                Some(w) => *w,
                None => self.modules.join_weight(member).unwrap_or_else(|| {
                    match tx.members.record(member).weight {
                        0 => DEFAULT_WEIGHT,
                        previous => previous,
                    }
                }),
            };
            tx.members.join(member, weight, index)?;
            tx.events.push(LedgerEvent::MemberJoined { member: *member, weight });
        }
        let commit = tx.finish()?;
        self.apply(commit);

        for (member, _) in entries {
            self.modules.notify_join(&ctx, member);
            tracing::info!(%member, "member joined");
        }
        Ok(())
    }

    /// Part `member`. A member may part itself; anyone else must be a
    /// join controller.
    pub fn part_member(&mut self, caller: &Address, member: Address) -> Result<()> {
        if *caller == member {
            self.require_initialized()?;
            return self.part_batch(&[member], PartReason::SelfRequest);
        }
        self.part_with_reason(caller, &[member], PartReason::Agent)
    }

    /// Part every address, or none of them.
    pub fn part_members(&mut self, caller: &Address, members: &[Address]) -> Result<()> {
        self.part_with_reason(caller, members, PartReason::Agent)
    }

    pub(crate) fn part_with_reason(&mut self, caller: &Address, members: &[Address], reason: PartReason) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_join_controller(caller)?;
        self.part_batch(members, reason)
    }

    fn part_batch(&mut self, members: &[Address], reason: PartReason) -> Result<()> {
        let ctx = self.hook_context();
        let mut tx = self.begin();
        self.stage_refresh(&mut tx, 0)?;
        let index = tx.index();
        for member in members {
            self.modules.check_part(&ctx, member, reason)?;
            tx.members.part(member, index)?;
            tx.events.push(LedgerEvent::MemberParted { member: *member, reason });
        }
        let commit = tx.finish()?;
        self.apply(commit);

        for member in members {
            self.modules.notify_part(&ctx, member, reason);
            tracing::info!(%member, ?reason, "member parted");
        }
        Ok(())
    }

    pub fn set_member_weight(&mut self, caller: &Address, member: Address, weight: Weight) -> Result<()> {
        self.set_member_weights(caller, &[(member, weight)])
    }

    /// Change weights. Earnings accrued so far keep the old weight.
    pub fn set_member_weights(&mut self, caller: &Address, members: &[(Address, Weight)]) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_join_controller(caller)?;

        let mut tx = self.begin();
        self.stage_refresh(&mut tx, 0)?;
        let index = tx.index();
        for (member, weight) in members {
            let old_weight = tx.members.record(member).weight;
            tx.members.reweight(member, *weight, index)?;
            tx.events.push(LedgerEvent::MemberWeightChanged {
                member: *member,
                old_weight,
                new_weight: *weight,
            });
        }
        let commit = tx.finish()?;
        self.apply(commit);
        tracing::info!(count = members.len(), total_weight = self.members.total_active_weight(), "member weights changed");
        Ok(())
    }

    // ---- withdrawals ----

    /// Withdraw `amount` of `member`'s earnings to the member. The caller
    /// must be the member or the owner.
    pub fn withdraw(&mut self, caller: &Address, member: &Address, amount: Amount) -> Result<Amount> {
        self.require_self_or_owner(caller, member)?;
        self.execute_withdrawals(&[WithdrawRequest {
            member: *member,
            recipient: *member,
            amount: Some(amount),
        }])
    }

    /// Refresh, then withdraw everything withdrawable to the member.
    pub fn withdraw_all(&mut self, caller: &Address, member: &Address) -> Result<Amount> {
        self.require_self_or_owner(caller, member)?;
        self.execute_withdrawals(&[WithdrawRequest {
            member: *member,
            recipient: *member,
            amount: None,
        }])
    }

    /// Withdraw the caller's own earnings to any recipient.
    pub fn withdraw_to(&mut self, caller: &Address, recipient: &Address, amount: Amount) -> Result<Amount> {
        self.execute_withdrawals(&[WithdrawRequest {
            member: *caller,
            recipient: *recipient,
            amount: Some(amount),
        }])
    }

    pub fn withdraw_all_to(&mut self, caller: &Address, recipient: &Address) -> Result<Amount> {
        self.execute_withdrawals(&[WithdrawRequest {
            member: *caller,
            recipient: *recipient,
            amount: None,
        }])
    }

    /// Withdraw on `member`'s behalf with their offline signature. The
    /// signature must cover exactly `amount`, or the unlimited sentinel.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::BadSignatureLength`] / [`LedgerError::BadSignatureVersion`] for malformed envelopes
    /// - [`LedgerError::BadSignature`] if the signature does not authorize this withdrawal now
    pub fn withdraw_to_signed(
        &mut self,
        member: &Address,
        recipient: &Address,
        amount: Amount,
        signature: &[u8],
    ) -> Result<Amount> {
        self.require_initialized()?;
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if !self.check_signature(member, recipient, amount, signature)?
            && !self.check_signature(member, recipient, UNLIMITED, signature)?
        {
            return Err(self.bad_signature(member));
        }
        self.execute_withdrawals(&[WithdrawRequest {
            member: *member,
            recipient: *recipient,
            amount: Some(amount),
        }])
    }

    /// Refresh, then withdraw everything withdrawable on `member`'s
    /// behalf. Requires an unlimited signature.
    pub fn withdraw_all_to_signed(&mut self, member: &Address, recipient: &Address, signature: &[u8]) -> Result<Amount> {
        self.require_initialized()?;
        if !self.check_signature(member, recipient, UNLIMITED, signature)? {
            return Err(self.bad_signature(member));
        }
        self.execute_withdrawals(&[WithdrawRequest {
            member: *member,
            recipient: *recipient,
            amount: None,
        }])
    }

    /// Owner-only: refresh, then pay out everything withdrawable for each
    /// member. Members with nothing to withdraw are skipped.
    pub fn withdraw_members(&mut self, caller: &Address, members: &[Address]) -> Result<Amount> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        let mut seen = std::collections::HashSet::new();
        for member in members {
            if !seen.insert(*member) {
                return Err(LedgerError::DuplicateAddress(*member));
            }
        }
        let requests: Vec<_> = members
            .iter()
            .map(|m| WithdrawRequest {
                member: *m,
                recipient: *m,
                amount: None,
            })
            .collect();
        self.execute_withdrawals(&requests)
    }

    /// Whether `signature` currently authorizes `signer`'s earnings to be
    /// withdrawn to `recipient` for `amount` (or [`UNLIMITED`]).
    pub fn signature_is_valid(&self, signer: &Address, recipient: &Address, amount: Amount, signature: &[u8]) -> Result<bool> {
        self.check_signature(signer, recipient, amount, signature)
    }

    fn check_signature(&self, signer: &Address, recipient: &Address, amount: Amount, signature: &[u8]) -> Result<bool> {
        let auth = WithdrawalAuthorization {
            recipient: *recipient,
            amount,
            ledger: self.identity,
            withdrawn_earnings: self.members.record(signer).withdrawn_earnings,
        };
        verify_authorization(signer, &auth, signature)
    }

    fn bad_signature(&self, member: &Address) -> LedgerError {
        LedgerError::BadSignature {
            signer: *member,
            withdrawn_earnings: self.members.record(member).withdrawn_earnings,
        }
    }

    fn require_self_or_owner(&self, caller: &Address, member: &Address) -> Result<()> {
        if caller == member || self.roles.is_owner(caller) {
            Ok(())
        } else {
            Err(LedgerError::NotPermitted {
                caller: *caller,
                member: *member,
            })
        }
    }

    fn execute_withdrawals(&mut self, requests: &[WithdrawRequest]) -> Result<Amount> {
        self.require_initialized()?;
        if requests.iter().any(|r| r.recipient.is_zero()) {
            return Err(LedgerError::InvalidAddress);
        }

        let ctx = self.hook_context();
        let mut tx = self.begin();
        if requests.iter().any(|r| r.amount.is_none()) {
            self.stage_refresh(&mut tx, 0)?;
        }
        let mut steps = Vec::with_capacity(requests.len());
        for request in requests {
            if let Some(step) = self.stage_withdrawal(&mut tx, &ctx, request)? {
                steps.push(step);
            }
        }
        let commit = tx.finish()?;

        let transfers: Vec<(Address, Amount)> = steps.iter().map(|s| (s.destination, s.amount)).collect();
        if !transfers.is_empty() {
            self.token.transfer_many(&self.identity, &transfers)?;
        }
        self.apply(commit);

        let mut total: Amount = 0;
        for step in &steps {
            self.modules
                .notify_withdraw(&ctx, &step.member, &step.recipient, &step.destination, step.amount);
            tracing::info!(
                member = %step.member,
                destination = %step.destination,
                amount = step.amount,
                "earnings withdrawn"
            );
            total = total.saturating_add(step.amount);
        }
        Ok(total)
    }

    fn stage_withdrawal(
        &self,
        tx: &mut Staged<'_>,
        ctx: &HookContext,
        request: &WithdrawRequest,
    ) -> Result<Option<WithdrawalStep>> {
        let index = tx.index();
        let amount = match request.amount {
            Some(0) => return Err(LedgerError::InvalidAmount),
            Some(amount) => amount,
            None => tx.members.record(&request.member).withdrawable(index)?,
        };
        if amount == 0 {
            return Ok(None);
        }

        tx.members.spend(&request.member, amount, index)?;
        self.modules
            .check_withdraw(ctx, &request.member, &request.recipient, amount)?;
        let destination = self
            .modules
            .route(ctx, &request.member, &request.recipient, amount);
        if destination.is_zero() {
            return Err(LedgerError::InvalidAddress);
        }
        tx.accounting = tx.accounting.with_withdrawal(amount)?;
        tx.events.push(LedgerEvent::EarningsWithdrawn {
            member: request.member,
            recipient: destination,
            amount,
        });
        Ok(Some(WithdrawalStep {
            member: request.member,
            recipient: request.recipient,
            destination,
            amount,
        }))
    }

    // ---- roles, fees, metadata ----

    pub fn require_owner(&self, caller: &Address) -> Result<()> {
        self.roles.require_owner(caller)
    }

    pub fn require_join_controller(&self, caller: &Address) -> Result<()> {
        self.roles.require_join_controller(caller)
    }

    /// Owner-only: propose `new_owner`. Takes effect on [`Ledger::claim_ownership`].
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.roles.propose_owner(new_owner)?;
        self.events.push(LedgerEvent::OwnershipTransferProposed {
            owner: *caller,
            pending_owner: new_owner,
        });
        tracing::info!(pending_owner = %new_owner, "ownership transfer proposed");
        Ok(())
    }

    pub fn claim_ownership(&mut self, caller: &Address) -> Result<()> {
        self.require_initialized()?;
        let previous_owner = self.roles.claim_ownership(caller)?;
        self.events.push(LedgerEvent::OwnershipTransferred {
            previous_owner,
            new_owner: *caller,
        });
        tracing::info!(%previous_owner, new_owner = %caller, "ownership transferred");
        Ok(())
    }

    pub fn add_join_part_agent(&mut self, caller: &Address, agent: Address) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.roles.add_agent(agent)?;
        self.events.push(LedgerEvent::JoinPartAgentAdded { agent });
        tracing::info!(%agent, "join-part agent added");
        Ok(())
    }

    pub fn remove_join_part_agent(&mut self, caller: &Address, agent: &Address) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.roles.remove_agent(agent)?;
        self.events.push(LedgerEvent::JoinPartAgentRemoved { agent: *agent });
        tracing::info!(%agent, "join-part agent removed");
        Ok(())
    }

    /// Owner-only. Fails if `admin + protocol` would exceed 1.
    pub fn set_admin_fee(&mut self, caller: &Address, admin_fee: Fraction) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        let mut tx = self.begin();
        self.stage_protocol_fee(&mut tx);
        tx.fees.set_admin_fee(admin_fee)?;
        tx.events.push(LedgerEvent::AdminFeeChanged {
            fraction: admin_fee.raw(),
        });
        let commit = tx.finish()?;
        self.apply(commit);
        tracing::info!(admin_fee = admin_fee.raw(), "admin fee changed");
        Ok(())
    }

    /// Pick up the oracle's current protocol fee. Callable by anyone.
    pub fn sync_protocol_fee(&mut self) -> Result<()> {
        self.require_initialized()?;
        let mut tx = self.begin();
        self.stage_protocol_fee(&mut tx);
        let commit = tx.finish()?;
        self.apply(commit);
        Ok(())
    }

    pub fn set_metadata(&mut self, caller: &Address, metadata: String) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.metadata = metadata.clone();
        self.events.push(LedgerEvent::MetadataChanged { metadata });
        Ok(())
    }

    // ---- modules ----

    pub fn register_module(&mut self, caller: &Address, slot: ListenerSlot, module: Arc<dyn LedgerModule>) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        let name = module.name().to_string();
        self.modules.register(slot, module)?;
        tracing::info!(module = %name, ?slot, "module registered");
        self.events.push(LedgerEvent::ModuleRegistered {
            slot: slot.module_slot(),
            name,
        });
        Ok(())
    }

    pub fn remove_module(&mut self, caller: &Address, slot: ListenerSlot, name: &str) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        self.modules.remove(slot, name)?;
        tracing::info!(module = name, ?slot, "module removed");
        self.events.push(LedgerEvent::ModuleRemoved {
            slot: slot.module_slot(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// Install (or with `None`, clear) the withdrawal router.
    pub fn set_withdraw_router(&mut self, caller: &Address, router: Option<Arc<dyn WithdrawRouter>>) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        let name = router.as_ref().map(|r| r.name().to_string());
        let previous = self.modules.set_router(router)?;
        let slot = dataunion_types::events::ModuleSlot::WithdrawRouter;
        if let Some(name) = previous {
            self.events.push(LedgerEvent::ModuleRemoved { slot, name });
        }
        if let Some(name) = name {
            tracing::info!(module = %name, "withdraw router installed");
            self.events.push(LedgerEvent::ModuleRegistered { slot, name });
        }
        Ok(())
    }

    /// Owner-only, one way: freeze every module slot.
    pub fn lock_modules(&mut self, caller: &Address) -> Result<()> {
        self.require_initialized()?;
        self.roles.require_owner(caller)?;
        if self.modules.lock() {
            self.events.push(LedgerEvent::ModulesLocked);
            tracing::info!("modules locked");
        }
        Ok(())
    }

    pub fn modules_locked(&self) -> bool {
        self.modules.is_locked()
    }

    pub fn module_names(&self, slot: ListenerSlot) -> Vec<String> {
        self.modules.names(slot)
    }

    pub fn withdraw_router_name(&self) -> Option<String> {
        self.modules.router().map(|r| r.name().to_string())
    }

    // ---- queries ----

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn owner(&self) -> Address {
        self.roles.owner()
    }

    pub fn pending_owner(&self) -> Option<Address> {
        self.roles.pending_owner()
    }

    pub fn is_join_part_agent(&self, who: &Address) -> bool {
        self.roles.is_agent(who)
    }

    pub fn join_part_agents(&self) -> Vec<Address> {
        self.roles.agents().copied().collect()
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn admin_fee(&self) -> Fraction {
        self.fees.admin_fee()
    }

    pub fn protocol_fee(&self) -> Fraction {
        self.fees.protocol_fee()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn get_stats(&self) -> Stats {
        Stats {
            total_revenue: self.accounting.total_revenue,
            total_earnings: self.accounting.total_earnings,
            total_admin_fees: self.accounting.total_admin_fees,
            total_protocol_fees: self.accounting.total_protocol_fees,
            total_withdrawn: self.accounting.total_withdrawn,
            active_member_count: self.members.active_count(),
            inactive_member_count: self.members.inactive_count(),
            lifetime_member_earnings: self.accounting.earnings_index,
            join_part_agent_count: self.roles.agent_count(),
            total_active_weight: self.members.total_active_weight(),
            undistributed: self.accounting.undistributed,
        }
    }

    /// Tokens held but not yet recognized by a refresh.
    pub fn unaccounted_revenue(&self) -> Amount {
        self.accounting
            .unaccounted(self.token.balance_of(&self.identity))
    }

    /// Lifetime earnings of a known address.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotMember`] if the address never joined or was credited
    pub fn get_earnings(&self, member: &Address) -> Result<Amount> {
        let record = self.members.record(member);
        if record.status == MemberStatus::None {
            return Err(LedgerError::NotMember(*member));
        }
        record.lifetime_earnings(self.accounting.earnings_index)
    }

    /// Withdrawable earnings; zero for unknown addresses.
    pub fn get_withdrawable_earnings(&self, member: &Address) -> Result<Amount> {
        self.members
            .record(member)
            .withdrawable(self.accounting.earnings_index)
    }

    pub fn get_member_info(&self, member: &Address) -> Result<MemberInfo> {
        self.members.info(member, self.accounting.earnings_index)
    }

    pub fn member_status(&self, member: &Address) -> MemberStatus {
        self.members.status(member)
    }

    pub fn is_active_member(&self, member: &Address) -> bool {
        self.members.is_active(member)
    }

    pub fn active_members(&self) -> Vec<Address> {
        self.members.active_members().copied().collect()
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Direct token access, e.g. to model transfers that bypass
    /// [`Ledger::pay_revenue`].
    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    /// A payment from the ledger to itself moves no tokens, so crediting
    /// it would create earnings the held balance cannot cover.
    fn require_external_payer(&self, payer: &Address) -> Result<()> {
        if payer.is_zero() || *payer == self.identity {
            return Err(LedgerError::InvalidAddress);
        }
        Ok(())
    }

    /// Drain events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Put back events that were taken but could not be delivered. They
    /// go ahead of anything emitted since, so order is preserved.
    pub fn requeue_events(&mut self, mut events: Vec<LedgerEvent>) {
        events.append(&mut self.events);
        self.events = events;
    }
}
