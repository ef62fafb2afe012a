//! SQLite connection pool

use std::path::Path;
use std::time::Instant;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::connection::SqliteConnection;
use super::error::{StorageError, StorageResult};
use super::pragmas::apply_connection_pragmas;

/// r2d2 pool of SQLite connections
///
/// Every connection gets the pragmas from [`SqlitePoolConfig`] applied when
/// it is opened. The pool verifies one connection at construction so a bad
/// path fails fast instead of on first use.
#[derive(Debug, Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
}

impl SqlitePool {
    /// Open (or create) the database at `path`
    #[instrument(skip(config), fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        if config.max_size == 0 {
            return Err(StorageError::InvalidConfig("pool size must be at least 1".into()));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pragma_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pragma_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!(error = %e, "failed to create connection pool");
                StorageError::Connection(format!("Failed to create pool: {e}"))
            })?;

        info!(max_size = config.max_size, "SQLite pool created");
        Ok(Self { pool, config })
    }

    /// Check a connection out of the pool
    #[instrument(level = "trace", skip(self), fields(pool_size = self.config.max_size))]
    pub fn get_connection(&self) -> StorageResult<SqliteConnection> {
        let start = Instant::now();
        match self.pool.get() {
            Ok(conn) => {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "connection acquired");
                Ok(SqliteConnection::new(conn))
            }
            Err(e) => {
                warn!(error = %e, "failed to acquire connection");
                Err(StorageError::Timeout(self.config.connection_timeout.as_secs()))
            }
        }
    }

    /// Run `SELECT 1` on a pooled connection
    pub fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", &[], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    pub fn max_size(&self) -> u32 {
        self.config.max_size
    }

    /// Connections currently checked out
    pub fn active_connections(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }
}
