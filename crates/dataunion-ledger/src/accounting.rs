//! Revenue accounting: the per-weight earnings index and aggregate totals.
//!
//! ## Formula
//!
//! ```text
//! index += (member_share + undistributed) / total_active_weight
//! lifetime(member) = earnings_before_last_join
//!                  + weight * (index - index_at_last_join)
//! ```
//!
//! The integer-division remainder, and the whole member share while no
//! one is active, stays in `undistributed` and joins the next
//! distribution. Fees are charged once, when revenue is first recognized.

use dataunion_types::{Amount, Weight};

use crate::fees::{FeePolicy, FeeSplit};
use crate::{LedgerError, Result};

/// Aggregate accounting state. Small and `Copy`: operations compute the
/// next state first and commit it only once every step has succeeded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RevenueAccounting {
    /// Cumulative earnings per weight unit since creation.
    pub earnings_index: Amount,
    pub undistributed: Amount,
    pub total_revenue: Amount,
    pub total_earnings: Amount,
    pub total_admin_fees: Amount,
    pub total_protocol_fees: Amount,
    pub total_withdrawn: Amount,
}

/// What one refresh did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Distribution {
    /// Newly recognized revenue.
    pub revenue: Amount,
    pub fees: FeeSplit,
    /// Amount credited to active members by this distribution.
    pub distributed: Amount,
    /// Index increase per weight unit.
    pub index_increment: Amount,
}

impl RevenueAccounting {
    /// Tokens the ledger should be holding for recognized revenue.
    pub fn accounted_balance(&self) -> Amount {
        self.total_revenue.saturating_sub(self.total_withdrawn)
    }

    /// Part of `held` not yet recognized as revenue.
    pub fn unaccounted(&self, held: Amount) -> Amount {
        held.saturating_sub(self.accounted_balance())
    }

    /// Compute the state after recognizing `revenue` and distributing it
    /// together with anything previously undistributed.
    pub fn distribute(
        &self,
        revenue: Amount,
        fees: &FeePolicy,
        total_weight: Weight,
        active_members: u64,
    ) -> Result<(RevenueAccounting, Distribution)> {
        let split = fees.split(revenue)?;
        let pool = split
            .member_share
            .checked_add(self.undistributed)
            .ok_or(LedgerError::Overflow)?;

        let (index_increment, distributed) = if active_members == 0 || total_weight == 0 {
            (0, 0)
        } else {
            let increment = pool / total_weight;
            (increment, increment * total_weight)
        };

        let next = RevenueAccounting {
            earnings_index: checked(self.earnings_index.checked_add(index_increment))?,
            undistributed: pool - distributed,
            total_revenue: checked(self.total_revenue.checked_add(revenue))?,
            total_earnings: checked(self.total_earnings.checked_add(distributed))?,
            total_admin_fees: checked(self.total_admin_fees.checked_add(split.admin_fee))?,
            total_protocol_fees: checked(self.total_protocol_fees.checked_add(split.protocol_fee))?,
            total_withdrawn: self.total_withdrawn,
        };
        let distribution = Distribution {
            revenue,
            fees: split,
            distributed,
            index_increment,
        };
        Ok((next, distribution))
    }

    /// State after crediting `amount` straight to a member (no fees).
    pub fn with_direct_credit(&self, amount: Amount) -> Result<RevenueAccounting> {
        Ok(RevenueAccounting {
            total_revenue: checked(self.total_revenue.checked_add(amount))?,
            total_earnings: checked(self.total_earnings.checked_add(amount))?,
            ..*self
        })
    }

    /// State after `amount` left the ledger.
    pub fn with_withdrawal(&self, amount: Amount) -> Result<RevenueAccounting> {
        Ok(RevenueAccounting {
            total_withdrawn: checked(self.total_withdrawn.checked_add(amount))?,
            ..*self
        })
    }

    /// `total_revenue == earnings + admin fees + protocol fees + undistributed`.
    pub fn is_conserved(&self) -> bool {
        let accounted = self.total_earnings as u128
            + self.total_admin_fees as u128
            + self.total_protocol_fees as u128
            + self.undistributed as u128;
        accounted == self.total_revenue as u128
    }
}

/// `before + weight * (index_now - index_then)`.
pub fn accrued(before: Amount, weight: Weight, index_then: Amount, index_now: Amount) -> Result<Amount> {
    let delta = index_now.saturating_sub(index_then) as u128;
    let total = before as u128 + weight as u128 * delta;
    Amount::try_from(total).map_err(|_| LedgerError::Overflow)
}

fn checked(value: Option<Amount>) -> Result<Amount> {
    value.ok_or(LedgerError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::Fraction;

    fn policy() -> FeePolicy {
        FeePolicy::new(Fraction::from_bps(900), Fraction::from_bps(100)).expect("policy")
    }

    #[test]
    fn test_distribute_three_members() {
        let acc = RevenueAccounting::default();
        let (next, dist) = acc.distribute(3000, &policy(), 3, 3).expect("distribute");
        assert_eq!(dist.index_increment, 900);
        assert_eq!(dist.distributed, 2700);
        assert_eq!(next.total_revenue, 3000);
        assert_eq!(next.total_admin_fees, 270);
        assert_eq!(next.total_protocol_fees, 30);
        assert_eq!(next.undistributed, 0);
        assert!(next.is_conserved());
    }

    #[test]
    fn test_remainder_carried_forward() {
        let acc = RevenueAccounting::default();
        let (next, dist) = acc.distribute(100, &FeePolicy::default(), 3, 3).expect("distribute");
        assert_eq!(dist.index_increment, 33);
        assert_eq!(next.undistributed, 1);
        assert!(next.is_conserved());

        let (after, dist) = next.distribute(2, &FeePolicy::default(), 3, 3).expect("distribute");
        assert_eq!(dist.index_increment, 1);
        assert_eq!(after.undistributed, 0);
        assert_eq!(after.earnings_index, 34);
        assert!(after.is_conserved());
    }

    #[test]
    fn test_deferred_without_members() {
        let acc = RevenueAccounting::default();
        let (next, dist) = acc.distribute(1000, &policy(), 0, 0).expect("distribute");
        assert_eq!(dist.distributed, 0);
        assert_eq!(next.total_admin_fees, 90);
        assert_eq!(next.undistributed, 900);
        assert!(next.is_conserved());

        // Swept without charging fees again.
        let (swept, dist) = next.distribute(0, &policy(), 2, 2).expect("sweep");
        assert_eq!(dist.distributed, 900);
        assert_eq!(swept.total_admin_fees, 90);
        assert_eq!(swept.undistributed, 0);
        assert!(swept.is_conserved());
    }

    #[test]
    fn test_unaccounted() {
        let acc = RevenueAccounting {
            total_revenue: 1000,
            total_withdrawn: 400,
            ..Default::default()
        };
        assert_eq!(acc.accounted_balance(), 600);
        assert_eq!(acc.unaccounted(600), 0);
        assert_eq!(acc.unaccounted(750), 150);
    }

    #[test]
    fn test_accrued() {
        assert_eq!(accrued(10, 2, 100, 150).expect("accrued"), 110);
        assert_eq!(accrued(10, 2, 150, 150).expect("accrued"), 10);
        assert_eq!(accrued(u64::MAX, 1, 0, 1), Err(LedgerError::Overflow));
    }
}
