//! SQL schema definitions.

/// Schema v1: event journal and settings.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_events (
    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    digest BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_events_kind ON ledger_events(kind, sequence);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
