//! draftsync Cache - Durable draft queue
//!
//! SQLite-backed implementation of the `IDraftStore` port from
//! `draftsync-core`. It is a driven (secondary) adapter in the hexagonal
//! architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with schema migration
//! - [`SqliteDraftStore`] - `IDraftStore` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use draftsync_cache::{DatabasePool, SqliteDraftStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::open(Path::new("/home/user/.local/share/draftsync/drafts.db")).await?;
//! let store = SqliteDraftStore::new(pool.pool().clone()).await?;
//! // Use store as IDraftStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteDraftStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to open the database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be turned back into a draft
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
