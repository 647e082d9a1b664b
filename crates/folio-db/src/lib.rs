//! # folio-db
//!
//! SQLite persistence for the royalty engine.
//!
//! ## Schema
//!
//! - WAL mode, foreign keys enforced
//! - Decimal amounts, rates, and shares stored as canonical TEXT
//! - Unit quantities stored as INTEGER (negative rows are returns)
//! - Dates stored as ISO-8601 TEXT (`YYYY-MM-DD`)
//! - Calculation documents are append-only (enforced by triggers)
//! - Schema version stored in `PRAGMA user_version`

pub mod migrations;
pub mod queries;
pub mod schema;
pub mod store;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::time::Duration;

use folio_royalty::RoyaltyError;
use rusqlite::Connection;

pub use store::SqliteStore;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Default time to wait for another writer before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Optimistic version check on a contract row failed.
    #[error("contract {contract_id} changed concurrently")]
    Conflict { contract_id: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("connection lock poisoned")]
    Poisoned,
}

impl DbError {
    /// Whether SQLite refused because another connection holds the write lock.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<DbError> for RoyaltyError {
    fn from(e: DbError) -> Self {
        RoyaltyError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    open_with_timeout(path, DEFAULT_LOCK_TIMEOUT)
}

/// Open with an explicit busy timeout for write-lock contention.
pub fn open_with_timeout(path: &Path, lock_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    conn.busy_timeout(lock_timeout)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing and previews).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

/// Parse a canonical decimal column.
pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<rust_decimal::Decimal> {
    value
        .parse()
        .map_err(|e| DbError::Serialization(format!("{column}: {value:?}: {e}")))
}

/// Parse an ISO date column.
pub(crate) fn parse_date(column: &str, value: &str) -> Result<chrono::NaiveDate> {
    value
        .parse()
        .map_err(|e| DbError::Serialization(format!("{column}: {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = open_memory().expect("open");
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("get foreign_keys");
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_open_file_uses_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open(&dir.path().join("folio.db")).expect("open");
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("get journal_mode");
        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_parse_helpers_reject_garbage() {
        assert!(parse_decimal("rate", "ten percent").is_err());
        assert!(parse_date("sale_date", "2026-13-01").is_err());
        assert_eq!(
            parse_decimal("rate", "0.125").expect("decimal").to_string(),
            "0.125"
        );
    }
}
