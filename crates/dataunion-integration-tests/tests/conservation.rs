//! Integration test: accounting invariants under long pseudo-random
//! operation sequences.
//!
//! After every operation, successful or not, revenue must be conserved
//! (`revenue = earnings + fees + undistributed`), the ledger must hold
//! enough tokens for everything withdrawable, and no member may have
//! withdrawn more than it earned.

use dataunion_integration_tests::{addr, Harness, AGENT, IDENTITY, OWNER, PAYER};
use dataunion_ledger::fees::Fraction;
use dataunion_ledger::token::Token;
use dataunion_types::Address;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const POPULATION: u8 = 12;

fn population() -> Vec<Address> {
    (0..POPULATION).map(|i| addr(0x40 + i)).collect()
}

fn check(h: &Harness, people: &[Address]) {
    h.assert_solvent();
    let stats = h.ledger.get_stats();
    let mut withdrawable_total: u128 = 0;
    for who in people.iter().chain([OWNER, dataunion_integration_tests::PROTOCOL].iter()) {
        let withdrawable = h.withdrawable(who);
        withdrawable_total += u128::from(withdrawable);
        if let Ok(info) = h.ledger.get_member_info(who) {
            assert!(info.withdrawn_earnings <= info.lifetime_earnings);
        }
    }
    let held = u128::from(h.ledger.token().balance_of(&IDENTITY));
    assert!(withdrawable_total <= held, "withdrawable {withdrawable_total} exceeds held {held}");
    assert_eq!(
        u64::try_from(h.ledger.active_members().len()).expect("fits"),
        stats.active_member_count
    );
}

fn run(seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut h = Harness::new(rng.gen_range(0..2000), rng.gen_range(0..500));
    let people = population();

    for _ in 0..steps {
        let who = people[rng.gen_range(0..people.len())];
        let amount = rng.gen_range(1..10_000u64);
        // Outcomes are irrelevant here; only the invariants matter.
        let _ = match rng.gen_range(0..10) {
            0 | 1 => h.ledger.add_member(&AGENT, who).map(|_| 0),
            2 => h
                .ledger
                .add_member_with_weight(&AGENT, who, rng.gen_range(1..5))
                .map(|_| 0),
            3 => h.ledger.part_member(&AGENT, who).map(|_| 0),
            4 => h.ledger.pay_revenue(&PAYER, amount),
            5 => h
                .ledger
                .token_mut()
                .mint(&IDENTITY, amount)
                .map(|_| 0)
                .map_err(Into::into),
            6 => h.ledger.withdraw_all(&who, &who),
            7 => h.ledger.withdraw(&who, &who, amount),
            8 => {
                let to = people[rng.gen_range(0..people.len())];
                h.ledger.transfer_within_contract(&who, &to, amount).map(|_| 0)
            }
            _ => {
                h.oracle.set_protocol_fee(Fraction::from_bps(rng.gen_range(0..3000)));
                h.ledger.refresh_revenue()
            }
        };
        check(&h, &people);
    }

    // Draining everyone leaves only dust that was never distributed.
    h.ledger.refresh_revenue().expect("final refresh");
    for who in people.iter().chain([OWNER, dataunion_integration_tests::PROTOCOL].iter()) {
        if h.withdrawable(who) > 0 {
            h.ledger.withdraw_all(who, who).expect("drain");
        }
    }
    let stats = h.ledger.get_stats();
    assert_eq!(h.ledger.token().balance_of(&IDENTITY), stats.undistributed);
}

#[test]
fn invariants_hold_over_random_sequences() {
    for seed in 0..20 {
        run(seed, 300);
    }
}

#[test]
fn refresh_is_idempotent() {
    let mut h = Harness::new(500, 100);
    h.join(addr(0x10));
    h.ledger.token_mut().mint(&IDENTITY, 1234).expect("mint");

    assert_eq!(h.ledger.refresh_revenue().expect("first"), 1234);
    h.ledger.take_events();
    let stats = h.ledger.get_stats();

    assert_eq!(h.ledger.refresh_revenue().expect("second"), 0);
    assert_eq!(h.ledger.get_stats(), stats);
    assert!(h.ledger.take_events().is_empty());
}
