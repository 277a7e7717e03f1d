//! Forward-only schema migrations.
//!
//! `MIGRATIONS[n]` takes the database from `user_version` n to n + 1.
//! Each step runs in its own transaction together with the version bump,
//! so a crash mid-migration leaves the previous version intact.

use rusqlite::Connection;

use crate::queries::settings;
use crate::{schema, DbError, Result, SCHEMA_VERSION};

const MIGRATIONS: &[fn(&rusqlite::Transaction<'_>) -> Result<()>] = &[create_v1];

fn create_v1(tx: &rusqlite::Transaction<'_>) -> Result<()> {
    tx.execute_batch(schema::SCHEMA_V1)?;
    // The journal is bound to a ledger on first daemon start.
    for (key, value) in [(settings::LEDGER_IDENTITY, ""), (settings::LAST_REFRESH_AT, "0")] {
        tx.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
    }
    Ok(())
}

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// # Errors
///
/// - [`DbError::Migration`] if the file was written by a newer build
pub fn run(conn: &mut Connection) -> Result<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database is at schema v{found}, this build supports up to v{SCHEMA_VERSION}"
        )));
    }
    for (from, step) in MIGRATIONS.iter().enumerate().skip(found as usize) {
        let to = from as u32 + 1;
        let tx = conn.transaction()?;
        step(&tx)?;
        tx.pragma_update(None, "user_version", to)?;
        tx.commit()?;
        tracing::info!(from, to, "database migrated");
    }
    Ok(())
}
