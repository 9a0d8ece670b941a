//! The single persistent store: peer directory, replay log, and chunk
//! buffer, all in one SQLite file opened once for the process lifetime
//! (ground: `services/receiver/src/db.rs::Db`, spec Design Note "Persistent
//! store" — kept together for transactional simplicity, logically
//! independent otherwise).

pub mod chunker;
pub mod keydir;
pub mod replay;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Owns the single `rusqlite::Connection` shared by the key directory,
/// replay log, and chunk buffer. Each of those is implemented as an `impl
/// Store` block in its own module file.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        run_integrity_check(&conn)?;
        Ok(Store { conn })
    }
}

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> StoreResult<()> {
    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}
