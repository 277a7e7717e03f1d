//! Aggregate ledger statistics.

use serde::{Deserialize, Serialize};

use crate::{Amount, Weight};

/// Snapshot returned by `getStats`.
///
/// Invariant: `total_revenue == total_earnings + total_admin_fees
/// + total_protocol_fees + undistributed`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_revenue: Amount,
    pub total_earnings: Amount,
    pub total_admin_fees: Amount,
    pub total_protocol_fees: Amount,
    pub total_withdrawn: Amount,
    pub active_member_count: u64,
    pub inactive_member_count: u64,
    /// Cumulative earnings of one weight unit since ledger creation.
    pub lifetime_member_earnings: Amount,
    pub join_part_agent_count: u64,
    pub total_active_weight: Weight,
    /// Member share held back: deferred while no one is active, or the
    /// remainder of the last integer division.
    pub undistributed: Amount,
}

impl Stats {
    /// Whether the revenue conservation law holds for this snapshot.
    pub fn is_conserved(&self) -> bool {
        let accounted = self.total_earnings as u128
            + self.total_admin_fees as u128
            + self.total_protocol_fees as u128
            + self.undistributed as u128;
        accounted == self.total_revenue as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats_conserved() {
        assert!(Stats::default().is_conserved());
    }

    #[test]
    fn test_conservation_detects_leak() {
        let stats = Stats {
            total_revenue: 3000,
            total_earnings: 2700,
            total_admin_fees: 270,
            total_protocol_fees: 29,
            ..Stats::default()
        };
        assert!(!stats.is_conserved());
    }
}
