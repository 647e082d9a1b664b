//! Schema migrations.
//!
//! `PRAGMA user_version` holds the number of applied steps. Several batch
//! workers may open a fresh file at the same moment, so pending steps are
//! applied under the write lock and the version is re-read once it is held.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Ordered migration steps; step `n` brings the schema to version `n + 1`.
const STEPS: &[&str] = &[schema::SCHEMA_V1];

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// # Errors
///
/// - [`DbError::Migration`] if the file was written by a newer release
pub fn run(conn: &Connection) -> Result<()> {
    if user_version(conn)? == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let current = user_version(&tx)?;
    if current > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    for (index, step) in STEPS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        tracing::info!(version, "applying schema migration");
        tx.execute_batch(step)?;
        tx.pragma_update(None, "user_version", version)?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        conn
    }

    #[test]
    fn test_steps_match_schema_version() {
        assert_eq!(STEPS.len() as u32, SCHEMA_VERSION);
    }

    #[test]
    fn test_fresh_migration() {
        let conn = fresh();
        run(&conn).expect("migrate");
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = fresh();
        run(&conn).expect("first run");
        run(&conn).expect("second run");
        assert_eq!(user_version(&conn).expect("version"), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_database_rejected() {
        let conn = fresh();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("set version");
        assert!(matches!(run(&conn), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_ledger_tables_created() {
        let conn = fresh();
        run(&conn).expect("migrate");

        for table in [
            "contracts",
            "contract_tiers",
            "contract_splits",
            "sales",
            "sales_coverage",
            "calculations",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("sqlite_master query");
            assert_eq!(count, 1, "table '{table}' should exist");
        }
    }
}
