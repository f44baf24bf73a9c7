//! Draft store port (driven/secondary port)
//!
//! Durable, queryable collection of pending drafts.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, ...) and are classified by the orchestrator.
//! - `delete` takes the whole [`DraftRecord`] and matches value and timestamp
//!   too: a draft superseded while its upload was in flight is not the one
//!   the remote confirmed, so it stays queued.
//! - Listing order is stable: oldest modification first, so chunking a
//!   listing is reproducible across runs.

use tokio::sync::watch;

use crate::domain::{DraftRecord, InstanceKey};

/// Port trait for the durable draft queue
#[async_trait::async_trait]
pub trait IDraftStore: Send + Sync {
    /// Inserts a draft or supersedes the draft with the same identity
    async fn upsert(&self, draft: &DraftRecord) -> anyhow::Result<()>;

    /// Lists every outstanding draft, oldest first
    async fn list_all(&self) -> anyhow::Result<Vec<DraftRecord>>;

    /// Lists outstanding drafts belonging to one instance, oldest first
    async fn list_for_instance(&self, key: &InstanceKey) -> anyhow::Result<Vec<DraftRecord>>;

    /// Deletes exactly this draft; returns `false` if it is absent or was
    /// superseded by a newer draft with the same identity
    async fn delete(&self, draft: &DraftRecord) -> anyhow::Result<bool>;

    /// Deletes every outstanding draft, returning how many were removed
    async fn delete_all(&self) -> anyhow::Result<u64>;

    /// Number of outstanding drafts
    async fn count(&self) -> anyhow::Result<usize>;

    /// Optional reactive view of the outstanding count
    ///
    /// Stores that can notify about writes return a receiver whose value is
    /// the current count; the connectivity watcher uses it to wake up when
    /// the queue becomes non-empty.
    fn watch_count(&self) -> Option<watch::Receiver<usize>> {
        None
    }
}
