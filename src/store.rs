use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::config::LfndbConfig;
use crate::error::LfndbError;

pub const SCHEMA_VERSION: i64 = 1;

/// Idempotent DDL batch for the ledger schema. Lineage edges are keyed by
/// LFN rather than row id so an edge can be recorded before either endpoint
/// has a file row.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dataset (
    id   INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS algorithm (
    id             INTEGER PRIMARY KEY,
    app_name       TEXT NOT NULL,
    app_ver        TEXT NOT NULL,
    app_fam        TEXT NOT NULL,
    pset_hash      TEXT NOT NULL,
    config_content TEXT,
    UNIQUE (app_name, app_ver, app_fam, pset_hash)
);
CREATE TABLE IF NOT EXISTS site (
    id        INTEGER PRIMARY KEY,
    site_name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS block (
    block_name TEXT PRIMARY KEY,
    status     TEXT NOT NULL DEFAULT 'OPEN',
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS file (
    id          INTEGER PRIMARY KEY,
    lfn         TEXT NOT NULL UNIQUE,
    filesize    INTEGER NOT NULL DEFAULT 0,
    event_count INTEGER NOT NULL DEFAULT 0,
    dataset_id  INTEGER REFERENCES dataset (id),
    algo_id     INTEGER REFERENCES algorithm (id),
    status      TEXT NOT NULL DEFAULT 'NOTUPLOADED',
    block_name  TEXT REFERENCES block (block_name),
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_dataset_status ON file (dataset_id, status);
CREATE TABLE IF NOT EXISTS file_checksum (
    file_id INTEGER NOT NULL REFERENCES file (id) ON DELETE CASCADE,
    kind    TEXT NOT NULL,
    digest  TEXT NOT NULL,
    PRIMARY KEY (file_id, kind)
);
CREATE TABLE IF NOT EXISTS file_run_lumi (
    file_id INTEGER NOT NULL REFERENCES file (id) ON DELETE CASCADE,
    run     INTEGER NOT NULL,
    lumi    INTEGER NOT NULL,
    PRIMARY KEY (file_id, run, lumi)
);
CREATE TABLE IF NOT EXISTS file_location (
    file_id INTEGER NOT NULL REFERENCES file (id) ON DELETE CASCADE,
    site_id INTEGER NOT NULL REFERENCES site (id),
    PRIMARY KEY (file_id, site_id)
);
CREATE TABLE IF NOT EXISTS block_location (
    block_name TEXT NOT NULL REFERENCES block (block_name) ON DELETE CASCADE,
    site_id    INTEGER NOT NULL REFERENCES site (id),
    PRIMARY KEY (block_name, site_id)
);
CREATE TABLE IF NOT EXISTS file_lineage (
    child_lfn  TEXT NOT NULL,
    parent_lfn TEXT NOT NULL,
    PRIMARY KEY (child_lfn, parent_lfn)
);
CREATE INDEX IF NOT EXISTS idx_file_lineage_parent ON file_lineage (parent_lfn);
";

/// Opens (creating if absent) a file-backed ledger store and applies the
/// configured pragmas. The caller owns the connection; run
/// [`bootstrap_schema`] once before issuing ledger operations.
pub fn open(path: impl AsRef<Path>, config: &LfndbConfig) -> Result<Connection, LfndbError> {
    let conn = Connection::open(path.as_ref())?;
    apply_pragmas(&conn, config)?;
    debug!(path = %path.as_ref().display(), "opened ledger store");
    Ok(conn)
}

/// In-memory variant of [`open`], used by tests and scratch tooling.
pub fn open_in_memory(config: &LfndbConfig) -> Result<Connection, LfndbError> {
    let conn = Connection::open_in_memory()?;
    apply_pragmas(&conn, config)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, config: &LfndbConfig) -> Result<(), LfndbError> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = {};",
        config.journal_mode.pragma_value()
    ))?;
    conn.execute_batch(&format!(
        "PRAGMA synchronous = {};",
        config.synchronous.pragma_value()
    ))?;
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = {};",
        if config.foreign_keys { "ON" } else { "OFF" }
    ))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Creates the ledger schema if this store has never been initialized, or
/// verifies the recorded schema version otherwise.
pub fn bootstrap_schema(conn: &Connection) -> Result<(), LfndbError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS lfndb_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = conn
        .query_row("SELECT version FROM lfndb_meta LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => {
            conn.execute_batch(SCHEMA)?;
            conn.execute(
                "INSERT INTO lfndb_meta (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
            info!(version = SCHEMA_VERSION, "ledger schema created");
            Ok(())
        }
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(LfndbError::IntegrityError {
            message: format!(
                "ledger schema version {found} is not supported (expected {SCHEMA_VERSION})"
            ),
        }),
    }
}

pub(crate) fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
