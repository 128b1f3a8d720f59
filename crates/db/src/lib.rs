//! # Drydock DB
//!
//! Persistence layer for Drydock: the append-only event ledger and the
//! host record repository, both over SQLite via SQLx.

pub mod event;
pub mod event_log;
pub mod host_repo;

pub use event::{EventLogEntry, EventPayload, ResourceType};
pub use event_log::EventLogger;
pub use host_repo::HostRepository;

use drydock_core::{Error, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Database version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database connection string
pub fn default_connection_string() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://drydock.db".to_string())
}

/// Open a pool against a connection string
pub async fn connect(url: &str) -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .map_err(|e| Error::Database(format!("failed to connect to '{url}': {e}")))
}

/// Open a single-connection in-memory database, for tests
pub async fn connect_memory() -> Result<SqlitePool> {
    // one connection, or each pool checkout would see a fresh empty db
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))
}
