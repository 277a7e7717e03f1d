//! Integration test: withdrawal paths end to end.
//!
//! Signed authorizations (exact and unlimited), replay protection through
//! the withdrawn-earnings nonce, owner batch payouts, and all-or-nothing
//! behaviour when a batch step fails.

use dataunion_integration_tests::{addr, signing_member, Harness, IDENTITY, OWNER};
use dataunion_ledger::token::Token;
use dataunion_ledger::withdraw::{WithdrawalAuthorization, UNLIMITED};
use dataunion_ledger::LedgerError;
use dataunion_types::events::LedgerEvent;

#[test]
fn signed_exact_amount_then_replay_rejected() {
    let mut h = Harness::new(0, 0);
    let (kp, member) = signing_member();
    let recipient = addr(0x71);
    h.join(member);
    h.pay(1000);

    let auth = WithdrawalAuthorization {
        recipient,
        amount: 400,
        ledger: IDENTITY,
        withdrawn_earnings: 0,
    };
    let sig = auth.sign(&kp.signing_key);
    assert!(h
        .ledger
        .signature_is_valid(&member, &recipient, 400, &sig)
        .expect("well-formed"));

    let paid = h
        .ledger
        .withdraw_to_signed(&member, &recipient, 400, &sig)
        .expect("signed withdraw");
    assert_eq!(paid, 400);
    assert_eq!(h.ledger.token().balance_of(&recipient), 400);

    let err = h
        .ledger
        .withdraw_to_signed(&member, &recipient, 400, &sig)
        .expect_err("replay");
    assert_eq!(
        err,
        LedgerError::BadSignature {
            signer: member,
            withdrawn_earnings: 400
        }
    );
    assert!(!h
        .ledger
        .signature_is_valid(&member, &recipient, 400, &sig)
        .expect("well-formed"));
    h.assert_solvent();
}

#[test]
fn unlimited_signature_covers_any_amount_once() {
    let mut h = Harness::new(0, 0);
    let (kp, member) = signing_member();
    let recipient = addr(0x71);
    h.join(member);
    h.pay(1000);

    let sig = WithdrawalAuthorization {
        recipient,
        amount: UNLIMITED,
        ledger: IDENTITY,
        withdrawn_earnings: 0,
    }
    .sign(&kp.signing_key);

    // An unlimited signature also authorizes a specific amount.
    let paid = h
        .ledger
        .withdraw_to_signed(&member, &recipient, 250, &sig)
        .expect("partial");
    assert_eq!(paid, 250);
    assert!(matches!(
        h.ledger.withdraw_all_to_signed(&member, &recipient, &sig),
        Err(LedgerError::BadSignature { .. })
    ));
}

#[test]
fn signature_for_another_ledger_is_rejected() {
    let mut h = Harness::new(0, 0);
    let (kp, member) = signing_member();
    h.join(member);
    h.pay(1000);

    let sig = WithdrawalAuthorization {
        recipient: member,
        amount: UNLIMITED,
        ledger: addr(0xee),
        withdrawn_earnings: 0,
    }
    .sign(&kp.signing_key);
    assert!(matches!(
        h.ledger.withdraw_all_to_signed(&member, &member, &sig),
        Err(LedgerError::BadSignature { .. })
    ));
    assert_eq!(h.withdrawable(&member), 1000);
}

#[test]
fn internal_transfer_stales_outstanding_signatures() {
    let mut h = Harness::new(0, 0);
    let (kp, member) = signing_member();
    h.join(member);
    h.pay(1000);

    let sig = WithdrawalAuthorization {
        recipient: member,
        amount: UNLIMITED,
        ledger: IDENTITY,
        withdrawn_earnings: 0,
    }
    .sign(&kp.signing_key);
    h.ledger
        .transfer_within_contract(&member, &addr(0x50), 1)
        .expect("transfer");
    assert!(h.ledger.withdraw_all_to_signed(&member, &member, &sig).is_err());
}

#[test]
fn unsigned_withdrawal_stales_signatures_for_any_recipient() {
    let mut h = Harness::new(0, 0);
    let (kp, member) = signing_member();
    let (named, elsewhere) = (addr(0x71), addr(0x72));
    h.join(member);
    h.pay(1000);

    let exact = WithdrawalAuthorization {
        recipient: named,
        amount: 300,
        ledger: IDENTITY,
        withdrawn_earnings: 0,
    }
    .sign(&kp.signing_key);
    let unlimited = WithdrawalAuthorization {
        recipient: named,
        amount: UNLIMITED,
        ledger: IDENTITY,
        withdrawn_earnings: 0,
    }
    .sign(&kp.signing_key);

    // The member pays someone else directly, without a signature.
    h.ledger
        .withdraw_to(&member, &elsewhere, 100)
        .expect("direct withdraw");
    assert!(!h
        .ledger
        .signature_is_valid(&member, &named, 300, &exact)
        .expect("well-formed"));
    assert_eq!(
        h.ledger.withdraw_to_signed(&member, &named, 300, &exact),
        Err(LedgerError::BadSignature {
            signer: member,
            withdrawn_earnings: 100
        })
    );
    assert!(h.ledger.withdraw_all_to_signed(&member, &named, &unlimited).is_err());

    // A fresh signature is stale again after an owner-triggered payout.
    let fresh = WithdrawalAuthorization {
        recipient: named,
        amount: UNLIMITED,
        ledger: IDENTITY,
        withdrawn_earnings: 100,
    }
    .sign(&kp.signing_key);
    assert!(h
        .ledger
        .signature_is_valid(&member, &named, UNLIMITED, &fresh)
        .expect("well-formed"));
    h.ledger.withdraw(&OWNER, &member, 50).expect("owner withdraw");
    assert!(h.ledger.withdraw_all_to_signed(&member, &named, &fresh).is_err());

    assert_eq!(h.ledger.token().balance_of(&named), 0);
    assert_eq!(h.ledger.token().balance_of(&elsewhere), 100);
    assert_eq!(h.withdrawable(&member), 850);
    h.assert_solvent();
}

#[test]
fn owner_batch_payout() {
    let mut h = Harness::new(1000, 0);
    let (a, b, idle) = (addr(0x10), addr(0x11), addr(0x12));
    h.join(a);
    h.join(b);
    h.pay(2000);
    h.join(idle);
    h.ledger.take_events();

    let paid = h.ledger.withdraw_members(&OWNER, &[a, b, idle]).expect("batch");
    assert_eq!(paid, 1800);
    assert_eq!(h.ledger.token().balance_of(&a), 900);
    assert_eq!(h.ledger.token().balance_of(&b), 900);

    // Members with nothing to withdraw are skipped silently.
    let events = h.ledger.take_events();
    let withdrawn: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, LedgerEvent::EarningsWithdrawn { .. }))
        .collect();
    assert_eq!(withdrawn.len(), 2);
    h.assert_solvent();
}

#[test]
fn batch_payout_is_all_or_nothing() {
    let mut h = Harness::new(0, 0);
    let (a, b) = (addr(0x10), addr(0x11));
    h.join(a);
    h.join(b);
    h.pay(2000);

    assert_eq!(
        h.ledger.withdraw_members(&OWNER, &[a, b, a]),
        Err(LedgerError::DuplicateAddress(a))
    );
    assert!(matches!(
        h.ledger.withdraw_members(&a, &[a, b]),
        Err(LedgerError::NotOwner { .. })
    ));
    assert_eq!(h.withdrawable(&a), 1000);
    assert_eq!(h.withdrawable(&b), 1000);
    assert_eq!(h.ledger.get_stats().total_withdrawn, 0);
}

#[test]
fn withdraw_permissions_and_amounts() {
    let mut h = Harness::new(0, 0);
    let (a, b) = (addr(0x10), addr(0x11));
    h.join(a);
    h.join(b);
    h.pay(2000);

    assert!(matches!(
        h.ledger.withdraw(&b, &a, 10),
        Err(LedgerError::NotPermitted { .. })
    ));
    assert_eq!(h.ledger.withdraw(&a, &a, 0), Err(LedgerError::InvalidAmount));
    assert!(matches!(
        h.ledger.withdraw(&a, &a, 1001),
        Err(LedgerError::InsufficientWithdrawable { available: 1000, .. })
    ));
    assert_eq!(h.ledger.withdraw(&OWNER, &a, 1000), Ok(1000));
    assert_eq!(h.ledger.withdraw_all(&a, &a), Ok(0));

    // Withdrawing to another account pays that account.
    assert_eq!(h.ledger.withdraw_to(&b, &addr(0x60), 300), Ok(300));
    assert_eq!(h.ledger.token().balance_of(&addr(0x60)), 300);
    assert_eq!(h.ledger.withdraw_all_to(&b, &addr(0x60)), Ok(700));
}
