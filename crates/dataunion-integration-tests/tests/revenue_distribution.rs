//! Integration test: pro-rata revenue distribution across a churning
//! member set.
//!
//! Covers the fee split, joins between revenue events, parting and
//! rejoining, weighted members, deferral while nobody is active and the
//! integer-division remainder carry.

use dataunion_integration_tests::{addr, Harness, OWNER, PROTOCOL};
use dataunion_types::member::MemberStatus;

#[test]
fn pro_rata_with_fees_and_late_joiner() {
    let mut h = Harness::new(900, 100);
    let (a, b, c, d) = (addr(0x10), addr(0x11), addr(0x12), addr(0x13));
    for m in [a, b, c] {
        h.join(m);
    }

    h.pay(3000);
    let stats = h.ledger.get_stats();
    assert_eq!(stats.total_admin_fees, 270);
    assert_eq!(stats.total_protocol_fees, 30);
    assert_eq!(stats.total_earnings, 2700);
    for m in [a, b, c] {
        assert_eq!(h.earnings(&m), 900);
    }

    h.join(d);
    h.pay(2000);
    for m in [a, b, c] {
        assert_eq!(h.earnings(&m), 1350);
    }
    assert_eq!(h.earnings(&d), 450);

    // Fees are credited to the owner and the protocol beneficiary.
    assert_eq!(h.withdrawable(&OWNER), 270 + 180);
    assert_eq!(h.withdrawable(&PROTOCOL), 30 + 20);
    assert_eq!(h.ledger.member_status(&OWNER), MemberStatus::Inactive);
    h.assert_solvent();
}

#[test]
fn parted_member_keeps_earnings_and_stops_accruing() {
    let mut h = Harness::new(0, 0);
    let (a, b) = (addr(0x10), addr(0x11));
    h.join(a);
    h.join(b);
    h.pay(1000);

    h.ledger.part_member(&a, a).expect("self part");
    h.pay(1000);
    assert_eq!(h.earnings(&a), 500);
    assert_eq!(h.earnings(&b), 1500);

    // Rejoining picks up from the current index, not from zero.
    h.join(a);
    h.pay(1000);
    assert_eq!(h.earnings(&a), 1000);
    assert_eq!(h.earnings(&b), 2000);
    h.assert_solvent();
}

#[test]
fn revenue_before_a_join_belongs_to_existing_members() {
    let mut h = Harness::new(0, 0);
    let (a, b) = (addr(0x10), addr(0x11));
    h.join(a);

    // Tokens arrive without notification, then b joins.
    h.ledger.token_mut().mint(&dataunion_integration_tests::IDENTITY, 600).expect("mint");
    h.join(b);
    assert_eq!(h.earnings(&a), 600);
    assert_eq!(h.earnings(&b), 0);
    h.assert_solvent();
}

#[test]
fn weighted_members_split_by_weight() {
    let mut h = Harness::new(0, 0);
    let (a, b) = (addr(0x10), addr(0x11));
    h.ledger
        .add_members_with_weights(&dataunion_integration_tests::AGENT, &[(a, 1), (b, 3)])
        .expect("add weighted");
    h.pay(4000);
    assert_eq!(h.earnings(&a), 1000);
    assert_eq!(h.earnings(&b), 3000);

    h.ledger
        .set_member_weight(&OWNER, b, 1)
        .expect("reweight");
    h.pay(4000);
    assert_eq!(h.earnings(&a), 3000);
    assert_eq!(h.earnings(&b), 5000);
    assert_eq!(h.ledger.get_stats().total_active_weight, 2);
}

#[test]
fn revenue_with_no_members_is_deferred() {
    let mut h = Harness::new(0, 0);
    h.pay(900);
    let stats = h.ledger.get_stats();
    assert_eq!(stats.total_revenue, 900);
    assert_eq!(stats.undistributed, 900);
    assert_eq!(stats.total_earnings, 0);
    assert!(stats.is_conserved());

    // The first members pick up the deferred share at the next refresh.
    let (a, b, c) = (addr(0x10), addr(0x11), addr(0x12));
    h.ledger.add_members(&dataunion_integration_tests::AGENT, &[a, b, c]).expect("add");
    h.ledger.refresh_revenue().expect("refresh");
    for m in [a, b, c] {
        assert_eq!(h.earnings(&m), 300);
    }
    assert_eq!(h.ledger.get_stats().undistributed, 0);
    h.assert_solvent();
}

#[test]
fn division_remainder_carries_forward() {
    let mut h = Harness::new(0, 0);
    let (a, b, c) = (addr(0x10), addr(0x11), addr(0x12));
    for m in [a, b, c] {
        h.join(m);
    }
    h.pay(100);
    assert_eq!(h.earnings(&a), 33);
    assert_eq!(h.ledger.get_stats().undistributed, 1);

    h.pay(101);
    // 101 + 1 carried = 102, 34 each.
    assert_eq!(h.earnings(&a), 67);
    assert_eq!(h.ledger.get_stats().undistributed, 0);
    h.assert_solvent();
}

#[test]
fn direct_credit_and_internal_transfer() {
    let mut h = Harness::new(1000, 0);
    let (a, outsider) = (addr(0x10), addr(0x40));
    h.join(a);

    // Direct credits skip fees and can target non-members.
    h.ledger
        .transfer_to_member_in_contract(&dataunion_integration_tests::PAYER, &outsider, 500)
        .expect("credit");
    assert_eq!(h.earnings(&outsider), 500);
    assert_eq!(h.ledger.member_status(&outsider), MemberStatus::Inactive);
    assert_eq!(h.ledger.get_stats().total_admin_fees, 0);

    h.ledger
        .transfer_within_contract(&outsider, &a, 200)
        .expect("internal transfer");
    assert_eq!(h.withdrawable(&outsider), 300);
    assert_eq!(h.withdrawable(&a), 200);
    assert_eq!(h.ledger.get_stats().inactive_member_count, 1);
    h.assert_solvent();
}
