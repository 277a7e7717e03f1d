//! Integration test: ledger events through the SQLite journal.

use dataunion_db::queries::events;
use dataunion_db::DbError;
use dataunion_integration_tests::{addr, journal_of, Harness, AGENT, BASE_TIME, OWNER};
use dataunion_types::events::LedgerEvent;
use dataunion_types::Amount;

/// Journal what the last operation emitted, then move the clock on.
fn step(h: &mut Harness, conn: &mut rusqlite::Connection) {
    let now = h.ledger.now();
    events::append(conn, now, &h.ledger.take_events()).expect("append");
    h.clock.advance(10);
}

/// A short ledger history, journaled one append per operation.
fn journaled_history() -> (Harness, rusqlite::Connection) {
    let mut h = Harness::new(1000, 0);
    let mut conn = dataunion_db::open_memory().expect("open journal");
    let (a, b) = (addr(0x10), addr(0x11));

    h.join(a);
    step(&mut h, &mut conn);
    h.join(b);
    step(&mut h, &mut conn);
    h.pay(1000);
    step(&mut h, &mut conn);
    h.ledger.withdraw_all(&a, &a).expect("withdraw");
    step(&mut h, &mut conn);
    h.ledger.part_member(&AGENT, b).expect("part");
    step(&mut h, &mut conn);
    h.pay(500);
    step(&mut h, &mut conn);
    (h, conn)
}

#[test]
fn journal_totals_match_ledger_stats() {
    let (h, conn) = journaled_history();
    let all = events::since(&conn, 0, 1000).expect("all events");
    assert_eq!(all.len() as u64, events::count(&conn).expect("count"));
    assert!(all.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(all[0].timestamp, BASE_TIME);

    let revenue: Amount = all
        .iter()
        .filter_map(|r| match r.event {
            LedgerEvent::RevenueReceived { amount } => Some(amount),
            _ => None,
        })
        .sum();
    let withdrawn: Amount = all
        .iter()
        .filter_map(|r| match r.event {
            LedgerEvent::EarningsWithdrawn { amount, .. } => Some(amount),
            _ => None,
        })
        .sum();
    let stats = h.ledger.get_stats();
    assert_eq!(revenue, stats.total_revenue);
    assert_eq!(withdrawn, stats.total_withdrawn);
    assert_eq!(revenue, 1500);
}

#[test]
fn journal_queries() {
    let (_h, conn) = journaled_history();

    let joins = events::by_kind(&conn, "MemberJoined", 10).expect("joins");
    assert_eq!(joins.len(), 2);
    assert_eq!(
        joins[0].event,
        LedgerEvent::MemberJoined {
            member: addr(0x10),
            weight: 1
        }
    );

    let recent = events::recent(&conn, 2).expect("recent");
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].event, LedgerEvent::RevenueReceived { amount: 500 });
    assert_eq!(recent[1].event.name(), "FeesCharged");

    let head = recent[1].sequence;
    assert!(events::since(&conn, head, 10).expect("caught up").is_empty());
    let tail = events::since(&conn, head - 2, 10).expect("tail");
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].sequence, head - 1);
}

#[test]
fn tampered_journal_is_detected() {
    let (_h, conn) = journaled_history();
    events::verify_chain(&conn).expect("intact");

    let forged = serde_json::to_string(&LedgerEvent::RevenueReceived { amount: 999_999 }).expect("encode");
    conn.execute(
        "UPDATE ledger_events SET payload = ?1 WHERE kind = 'RevenueReceived' AND sequence = (
             SELECT MIN(sequence) FROM ledger_events WHERE kind = 'RevenueReceived')",
        [forged],
    )
    .expect("tamper");

    let first_revenue = events::by_kind(&conn, "RevenueReceived", 10).expect("revenue")[0].sequence;
    assert!(matches!(
        events::verify_chain(&conn),
        Err(DbError::Corrupted(seq)) if seq == first_revenue
    ));
}

#[test]
fn deleted_row_breaks_chain() {
    let mut h = Harness::new(0, 0);
    h.join(addr(0x10));
    h.ledger.lock_modules(&OWNER).expect("lock");
    let conn = journal_of(&h.ledger.take_events());
    assert_eq!(events::count(&conn).expect("count"), 2);

    conn.execute("DELETE FROM ledger_events WHERE sequence = 1", [])
        .expect("delete");
    assert!(matches!(events::verify_chain(&conn), Err(DbError::Corrupted(2))));
}

#[test]
fn empty_operations_journal_nothing() {
    let mut h = Harness::new(0, 0);
    assert_eq!(h.ledger.refresh_revenue(), Ok(0));
    let conn = journal_of(&h.ledger.take_events());
    assert_eq!(events::count(&conn).expect("count"), 0);
    events::verify_chain(&conn).expect("empty chain verifies");
}
