//! Daemon settings: a string key/value table.

use rusqlite::{Connection, OptionalExtension};

use crate::{DbError, Result};

/// Hex address of the ledger this journal belongs to; empty until bound.
pub const LEDGER_IDENTITY: &str = "ledger_identity";

/// Unix seconds of the last refresh that recognized revenue.
pub const LAST_REFRESH_AT: &str = "last_refresh_at";

/// # Errors
///
/// - [`DbError::NotFound`] if the key was never set
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("setting '{key}'")))
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Numeric setting, or `default` when unset.
pub fn get_u64(conn: &Connection, key: &str, default: u64) -> Result<u64> {
    match get(conn, key) {
        Ok(v) => v
            .parse()
            .map_err(|_| DbError::Serialization(format!("setting '{key}' is not a number: {v:?}"))),
        Err(DbError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}
