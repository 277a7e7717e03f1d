//! # dataunion-db
//!
//! Persistence for the Data Union daemon: an append-only journal of
//! ledger events plus a small settings table, in one SQLite file at
//! `$DATAUNION_DATA_DIR/dataunion.db`.
//!
//! Journal rows are hash-chained (see [`queries::events`]), timestamps are
//! Unix seconds, and the schema version lives in `PRAGMA user_version`.

pub mod migrations;
pub mod queries;
pub mod schema;

use std::path::Path;

use rusqlite::Connection;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A journal row's digest does not match its content and predecessor.
    #[error("journal corrupted at sequence {0}")]
    Corrupted(u64),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open (creating if needed) the journal file, in WAL mode, migrated to
/// the current schema.
pub fn open(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    // Single writer (the ledger actor), concurrent readers (RPC queries).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA busy_timeout = 5000;",
    )?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

/// In-memory journal for tests.
pub fn open_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    migrations::run(&mut conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_is_migrated() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_file_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("dataunion-db-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("dataunion.db");

        let mut conn = open(&path).expect("open");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("get journal_mode");
        assert_eq!(mode, "wal");
        queries::events::append(&mut conn, 1, &[dataunion_types::events::LedgerEvent::ModulesLocked])
            .expect("append");
        drop(conn);

        let conn = open(&path).expect("reopen");
        assert_eq!(queries::events::count(&conn).expect("count"), 1);
        queries::events::verify_chain(&conn).expect("chain intact");
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
