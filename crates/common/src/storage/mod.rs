//! Pooled SQLite storage
//!
//! r2d2 pool over bundled SQLite with per-connection pragmas (WAL, busy
//! timeout, foreign keys). Schema management stays with the application.

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod pragmas;

pub use config::SqlitePoolConfig;
pub use connection::SqliteConnection;
pub use error::{StorageError, StorageResult};
pub use pool::SqlitePool;
