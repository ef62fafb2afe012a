//! SQLite pragma management
//!
//! Applies per-connection pragmas for concurrency and integrity.

use rusqlite::Connection;

use super::config::SqlitePoolConfig;
use super::error::{StorageError, StorageResult};

/// Apply connection-level pragmas
///
/// Run on every connection the pool opens:
/// - WAL journal with autocheckpoint after 1000 pages
/// - NORMAL synchronous mode
/// - foreign key enforcement (the participants table relies on cascades)
/// - busy timeout for writer contention
pub fn apply_connection_pragmas(conn: &Connection, config: &SqlitePoolConfig) -> StorageResult<()> {
    let mut pragma_sql = String::new();

    if config.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }

    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");

    if config.enable_foreign_keys {
        pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");
    }

    conn.execute_batch(&pragma_sql)
        .map_err(|e| StorageError::Query(format!("Failed to apply pragmas: {e}")))?;

    conn.busy_timeout(config.busy_timeout)
        .map_err(|e| StorageError::Query(format!("Failed to set busy timeout: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn pragmas_enable_wal_and_foreign_keys() {
        let dir = TempDir::new().expect("temp dir");
        let conn = Connection::open(dir.path().join("pragmas.db")).expect("open");

        apply_connection_pragmas(&conn, &SqlitePoolConfig::default()).expect("pragmas");

        let mode: String =
            conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).expect("journal_mode");
        assert_eq!(mode.to_lowercase(), "wal");

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).expect("fk");
        assert_eq!(fk, 1);
    }
}
