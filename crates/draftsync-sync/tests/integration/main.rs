//! Integration tests for draftsync-sync
//!
//! Drives the SyncOrchestrator against in-memory fakes of the draft store,
//! the remote client and the connectivity signal. Time-dependent tests run
//! with a paused tokio clock so backoff waits and timeouts are instant.


mod test_control;
mod test_queue_sync;
mod test_retry;
mod test_watcher;
