//! Member registry: per-address lifecycle records and the aggregate
//! counters derived from them.
//!
//! Record transitions are pure functions on [`MemberRecord`]. Operations
//! stage them in a [`Changeset`], which overlays the registry so later
//! steps of a batch see earlier ones, and the ledger commits the whole
//! changeset with [`MemberRegistry::apply`] only once every step has
//! succeeded.

use std::collections::HashMap;

use dataunion_types::member::{MemberInfo, MemberStatus};
use dataunion_types::{Address, Amount, Weight};

use crate::accounting::accrued;
use crate::{LedgerError, Result};

/// Stored per-member state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemberRecord {
    pub status: MemberStatus,
    pub weight: Weight,
    /// Lifetime earnings as of the last join, part, weight change or credit.
    pub earnings_before_last_join: Amount,
    /// Earnings index at that snapshot.
    pub index_at_last_join: Amount,
    pub withdrawn_earnings: Amount,
}

impl MemberRecord {
    /// Everything ever credited, given the current earnings index.
    pub fn lifetime_earnings(&self, index: Amount) -> Result<Amount> {
        match self.status {
            MemberStatus::Active => accrued(
                self.earnings_before_last_join,
                self.weight,
                self.index_at_last_join,
                index,
            ),
            _ => Ok(self.earnings_before_last_join),
        }
    }

    pub fn withdrawable(&self, index: Amount) -> Result<Amount> {
        Ok(self
            .lifetime_earnings(index)?
            .saturating_sub(self.withdrawn_earnings))
    }

    /// Copy with accrued earnings folded into the snapshot.
    fn snapshot(&self, index: Amount) -> Result<MemberRecord> {
        Ok(MemberRecord {
            earnings_before_last_join: self.lifetime_earnings(index)?,
            index_at_last_join: index,
            ..*self
        })
    }

    /// `None` and `Inactive` members may join; accrued earnings carry over.
    pub fn joined(&self, member: &Address, weight: Weight, index: Amount) -> Result<MemberRecord> {
        if weight == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.status == MemberStatus::Active {
            return Err(LedgerError::AlreadyActiveMember(*member));
        }
        Ok(MemberRecord {
            status: MemberStatus::Active,
            weight,
            ..self.snapshot(index)?
        })
    }

    /// Earnings stay withdrawable after parting.
    pub fn parted(&self, member: &Address, index: Amount) -> Result<MemberRecord> {
        if self.status != MemberStatus::Active {
            return Err(LedgerError::NotActiveMember(*member));
        }
        Ok(MemberRecord {
            status: MemberStatus::Inactive,
            ..self.snapshot(index)?
        })
    }

    /// Earnings to date are snapshotted against the old weight so the new
    /// weight never applies backwards.
    pub fn reweighted(&self, member: &Address, weight: Weight, index: Amount) -> Result<MemberRecord> {
        if weight == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.status == MemberStatus::None {
            return Err(LedgerError::NotMember(*member));
        }
        Ok(MemberRecord {
            weight,
            ..self.snapshot(index)?
        })
    }

    /// Unknown addresses become inactive pseudo-members.
    pub fn credited(&self, amount: Amount, index: Amount) -> Result<MemberRecord> {
        let mut next = self.snapshot(index)?;
        next.earnings_before_last_join = next
            .earnings_before_last_join
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        if next.status == MemberStatus::None {
            next.status = MemberStatus::Inactive;
        }
        Ok(next)
    }

    /// # Errors
    ///
    /// - [`LedgerError::InsufficientWithdrawable`] if `amount` exceeds what is withdrawable
    pub fn spent(&self, member: &Address, amount: Amount, index: Amount) -> Result<MemberRecord> {
        let available = self.withdrawable(index)?;
        if amount > available {
            return Err(LedgerError::InsufficientWithdrawable {
                member: *member,
                requested: amount,
                available,
            });
        }
        Ok(MemberRecord {
            withdrawn_earnings: self.withdrawn_earnings + amount,
            ..*self
        })
    }
}

/// All member records plus counters.
#[derive(Clone, Debug, Default)]
pub struct MemberRegistry {
    members: HashMap<Address, MemberRecord>,
    active_count: u64,
    inactive_count: u64,
    total_active_weight: Weight,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> u64 {
        self.active_count
    }

    pub fn inactive_count(&self) -> u64 {
        self.inactive_count
    }

    pub fn total_active_weight(&self) -> Weight {
        self.total_active_weight
    }

    /// Stored record, or the empty `None`-status record.
    pub fn record(&self, member: &Address) -> MemberRecord {
        self.members.get(member).copied().unwrap_or_default()
    }

    pub fn status(&self, member: &Address) -> MemberStatus {
        self.record(member).status
    }

    pub fn is_active(&self, member: &Address) -> bool {
        self.status(member) == MemberStatus::Active
    }

    /// Addresses of all active members, in no particular order.
    pub fn active_members(&self) -> impl Iterator<Item = &Address> {
        self.members
            .iter()
            .filter(|(_, r)| r.status == MemberStatus::Active)
            .map(|(a, _)| a)
    }

    /// Start staging changes on top of the current state.
    pub fn changeset(&self) -> Changeset<'_> {
        Changeset {
            base: self,
            staged: Vec::new(),
            active_weight: self.total_active_weight as u128,
        }
    }

    /// Commit staged records in order.
    pub fn apply(&mut self, changes: Vec<(Address, MemberRecord)>) {
        for (member, next) in changes {
            self.commit(member, next);
        }
    }

    fn commit(&mut self, member: Address, next: MemberRecord) {
        let previous = self.record(&member);
        match previous.status {
            MemberStatus::Active => {
                self.active_count -= 1;
                self.total_active_weight -= previous.weight;
            }
            MemberStatus::Inactive => self.inactive_count -= 1,
            MemberStatus::None => {}
        }
        match next.status {
            MemberStatus::Active => {
                self.active_count += 1;
                self.total_active_weight = self.total_active_weight.saturating_add(next.weight);
            }
            MemberStatus::Inactive => self.inactive_count += 1,
            MemberStatus::None => {}
        }
        self.members.insert(member, next);
    }

    /// Read-only view. Unknown addresses yield a zeroed `None` entry.
    pub fn info(&self, member: &Address, index: Amount) -> Result<MemberInfo> {
        let record = self.record(member);
        let lifetime_earnings = record.lifetime_earnings(index)?;
        Ok(MemberInfo {
            address: *member,
            status: record.status,
            weight: record.weight,
            lifetime_earnings,
            withdrawn_earnings: record.withdrawn_earnings,
            withdrawable: lifetime_earnings.saturating_sub(record.withdrawn_earnings),
        })
    }
}

/// Pending record changes over a borrowed registry.
pub struct Changeset<'a> {
    base: &'a MemberRegistry,
    staged: Vec<(Address, MemberRecord)>,
    active_weight: u128,
}

impl Changeset<'_> {
    /// Latest record for `member`, staged or stored.
    pub fn record(&self, member: &Address) -> MemberRecord {
        self.staged
            .iter()
            .rev()
            .find(|(a, _)| a == member)
            .map(|(_, r)| *r)
            .unwrap_or_else(|| self.base.record(member))
    }

    /// Active weight once the staged changes are committed.
    pub fn active_weight(&self) -> Result<Weight> {
        Weight::try_from(self.active_weight).map_err(|_| LedgerError::Overflow)
    }

    pub fn join(&mut self, member: &Address, weight: Weight, index: Amount) -> Result<MemberRecord> {
        let next = self.record(member).joined(member, weight, index)?;
        self.stage(*member, next)
    }

    pub fn part(&mut self, member: &Address, index: Amount) -> Result<MemberRecord> {
        let next = self.record(member).parted(member, index)?;
        self.stage(*member, next)
    }

    pub fn reweight(&mut self, member: &Address, weight: Weight, index: Amount) -> Result<MemberRecord> {
        let next = self.record(member).reweighted(member, weight, index)?;
        self.stage(*member, next)
    }

    pub fn credit(&mut self, member: &Address, amount: Amount, index: Amount) -> Result<MemberRecord> {
        let next = self.record(member).credited(amount, index)?;
        self.stage(*member, next)
    }

    pub fn spend(&mut self, member: &Address, amount: Amount, index: Amount) -> Result<MemberRecord> {
        let next = self.record(member).spent(member, amount, index)?;
        self.stage(*member, next)
    }

    fn stage(&mut self, member: Address, next: MemberRecord) -> Result<MemberRecord> {
        let previous = self.record(&member);
        if previous.status == MemberStatus::Active {
            self.active_weight = self.active_weight.saturating_sub(previous.weight as u128);
        }
        if next.status == MemberStatus::Active {
            self.active_weight += next.weight as u128;
        }
        self.staged.push((member, next));
        Ok(next)
    }

    /// Release the borrow, keeping the staged records in order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] if the resulting active weight does not fit
    pub fn into_changes(self) -> Result<Vec<(Address, MemberRecord)>> {
        self.active_weight()?;
        Ok(self.staged)
    }
}
