//! draftsync Sync - offline-first sync orchestration
//!
//! Provides:
//! - Chunked, resumable upload of the draft queue
//! - Classified errors with bounded exponential-backoff retries
//! - Phase and progress reporting through `watch` channels
//! - Automatic resume when connectivity returns
//!
//! ## Modules
//!
//! - [`orchestrator`] - Run control, chunked upload and bookkeeping
//! - [`watcher`] - Connectivity watcher that triggers background runs
//! - [`connectivity`] - TCP probe and manually driven connectivity signals
//! - [`classifier`] - Maps port faults to [`SyncError`]
//! - [`retry`] - Shared retry policy
//! - [`chunker`] - Queue chunking and adaptive chunk sizing
//! - [`progress`] - Sync state, phases and progress snapshots

pub mod chunker;
pub mod classifier;
pub mod connectivity;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod watcher;

pub use error::{RunError, SyncError};
pub use orchestrator::{RunKind, SyncOrchestrator, SyncOutcome, SyncSettings, CANCELLED_BY_USER};
pub use progress::{DetailedSyncProgress, SyncPhase, SyncState};
pub use retry::RetryPolicy;
