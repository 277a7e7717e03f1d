//! Ledger event journal.
//!
//! Rows are append-only. Each row's digest is
//! `derive_key(EVENT_JOURNAL, previous_digest || payload)`, starting from
//! 32 zero bytes, so [`verify_chain`] detects edited or deleted rows.

use dataunion_crypto::blake3::{self, contexts};
use dataunion_types::events::{EventRecord, LedgerEvent};
use rusqlite::{Connection, OptionalExtension};

use crate::{DbError, Result};

const GENESIS_DIGEST: [u8; 32] = [0u8; 32];

fn chain(previous: &[u8; 32], payload: &str) -> [u8; 32] {
    let mut material = Vec::with_capacity(32 + payload.len());
    material.extend_from_slice(previous);
    material.extend_from_slice(payload.as_bytes());
    blake3::derive_key(contexts::EVENT_JOURNAL, &material)
}

/// Digest of the newest row, or the genesis digest for an empty journal.
pub fn head_digest(conn: &Connection) -> Result<[u8; 32]> {
    let digest: Option<Vec<u8>> = conn
        .query_row(
            "SELECT digest FROM ledger_events ORDER BY sequence DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match digest {
        None => Ok(GENESIS_DIGEST),
        Some(bytes) => bytes
            .try_into()
            .map_err(|_| DbError::Serialization("journal digest is not 32 bytes".to_string())),
    }
}

/// Append events emitted by one operation, in one transaction.
/// Returns the sequence numbers assigned.
pub fn append(conn: &mut Connection, timestamp: u64, events: &[LedgerEvent]) -> Result<Vec<u64>> {
    if events.is_empty() {
        return Ok(Vec::new());
    }
    let tx = conn.transaction()?;
    let mut previous = head_digest(&tx)?;
    let mut sequences = Vec::with_capacity(events.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO ledger_events (timestamp, kind, payload, digest) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for event in events {
            let payload =
                serde_json::to_string(event).map_err(|e| DbError::Serialization(e.to_string()))?;
            let digest = chain(&previous, &payload);
            stmt.execute(rusqlite::params![
                timestamp as i64,
                event.name(),
                payload,
                digest.as_slice()
            ])?;
            sequences.push(tx.last_insert_rowid() as u64);
            previous = digest;
        }
    }
    tx.commit()?;
    tracing::debug!(count = events.len(), head = %hex::encode(previous), "events journaled");
    Ok(sequences)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn decode(rows: Vec<(i64, i64, String)>) -> Result<Vec<EventRecord>> {
    rows.into_iter()
        .map(|(sequence, timestamp, payload)| {
            let event: LedgerEvent = serde_json::from_str(&payload)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            Ok(EventRecord {
                sequence: sequence as u64,
                timestamp: timestamp as u64,
                event,
            })
        })
        .collect()
}

/// Newest `limit` events, oldest first.
pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<EventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, timestamp, payload FROM (
             SELECT sequence, timestamp, payload FROM ledger_events
             ORDER BY sequence DESC LIMIT ?1
         ) ORDER BY sequence ASC",
    )?;
    let rows = stmt
        .query_map([limit], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    decode(rows)
}

/// Events after `sequence`, oldest first. Used by subscribers catching up.
pub fn since(conn: &Connection, sequence: u64, limit: u32) -> Result<Vec<EventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, timestamp, payload FROM ledger_events
         WHERE sequence > ?1 ORDER BY sequence ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![sequence as i64, limit], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    decode(rows)
}

/// Newest `limit` events of one kind (see `LedgerEvent::name`), oldest first.
pub fn by_kind(conn: &Connection, kind: &str, limit: u32) -> Result<Vec<EventRecord>> {
    let mut stmt = conn.prepare(
        "SELECT sequence, timestamp, payload FROM (
             SELECT sequence, timestamp, payload FROM ledger_events
             WHERE kind = ?1 ORDER BY sequence DESC LIMIT ?2
         ) ORDER BY sequence ASC",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![kind, limit], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    decode(rows)
}

pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM ledger_events", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Recompute the digest chain over the whole journal.
///
/// # Errors
///
/// - [`DbError::Corrupted`] with the first sequence whose digest does not match
pub fn verify_chain(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT sequence, payload, digest FROM ledger_events ORDER BY sequence ASC")?;
    let mut rows = stmt.query([])?;
    let mut previous = GENESIS_DIGEST;
    while let Some(row) = rows.next()? {
        let sequence: i64 = row.get(0)?;
        let payload: String = row.get(1)?;
        let digest: Vec<u8> = row.get(2)?;
        let expected = chain(&previous, &payload);
        if digest.as_slice() != expected.as_slice() {
            return Err(DbError::Corrupted(sequence as u64));
        }
        previous = expected;
    }
    Ok(())
}
