//! Control surface: run guard, cancellation, forced restart, queue management
//! and the download-only / metadata variants

use draftsync_sync::{RunError, SyncPhase, CANCELLED_BY_USER};

use crate::common::{self, eventually, Fault, Harness, Step};

// ============================================================================
// Run guard
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_start_is_rejected_while_running() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 5));
    let gate = h.remote.gate_uploads();

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.start_sync(false).await });
    h.remote.wait_for_uploads(1).await;

    assert_eq!(
        h.orchestrator.start_sync(false).await.unwrap_err(),
        RunError::AlreadyRunning
    );
    assert_eq!(
        h.orchestrator
            .start_sync_for_instance(key.clone(), false)
            .await
            .unwrap_err(),
        RunError::AlreadyRunning
    );
    assert!(!h.orchestrator.queue_for_sync().await.unwrap());
    assert_eq!(
        h.orchestrator.clear_queue().await.unwrap_err(),
        RunError::AlreadyRunning
    );

    gate.notify_one();
    first.await.unwrap().expect("first run failed");
    assert_eq!(h.remote.upload_calls(), 1);
    assert_eq!(h.store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_starts_admit_exactly_one() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 5));

    let (a, b) = tokio::join!(
        h.orchestrator.start_sync(false),
        h.orchestrator.start_sync(false)
    );

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(RunError::AlreadyRunning)))
        .count();
    assert_eq!((successes, rejected), (1, 1));
    assert_eq!(h.remote.upload_calls(), 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_keeps_uploaded_chunks_deleted_and_rest_queued() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 90);
    let h = Harness::new(drafts.clone());
    h.remote.script([Step::Accept, Step::Hang]);

    let orchestrator = h.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.start_sync(false).await });
    h.remote.wait_for_uploads(2).await;

    assert!(h.orchestrator.cancel_sync().await);

    assert_eq!(run.await.unwrap().unwrap_err(), RunError::Cancelled);
    assert_eq!(
        common::identities(&h.store.snapshot()),
        common::identities(&drafts[30..])
    );

    let state = h.orchestrator.state();
    assert!(!state.is_running);
    assert_eq!(state.error.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(state.queue_size, 60);
    assert!(h.orchestrator.progress().is_none());
    assert!(!h.orchestrator.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_backoff_wait() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 10));
    h.remote.script([Step::Fail(Fault::Reset)]);

    let orchestrator = h.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.start_sync(false).await });

    // Wait until the retry countdown is published
    let mut rx = h.orchestrator.subscribe_progress();
    loop {
        let waiting = rx
            .borrow_and_update()
            .as_ref()
            .is_some_and(|p| p.auto_retry_in.is_some());
        if waiting {
            break;
        }
        rx.changed().await.unwrap();
    }

    assert!(h.orchestrator.cancel_sync().await);
    assert_eq!(run.await.unwrap().unwrap_err(), RunError::Cancelled);
    // No second attempt was made
    assert_eq!(h.remote.upload_calls(), 1);
    assert_eq!(h.store.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_without_active_run_is_noop() {
    let h = Harness::new(Vec::new());
    assert!(!h.orchestrator.cancel_sync().await);
    assert!(h.orchestrator.state().error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_forced_start_cancels_active_run() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 10));
    h.remote.script([Step::Hang]);

    let orchestrator = h.orchestrator.clone();
    let stuck = tokio::spawn(async move { orchestrator.start_sync(false).await });
    h.remote.wait_for_uploads(1).await;

    let outcome = h.orchestrator.start_sync(true).await.expect("forced run failed");

    assert_eq!(stuck.await.unwrap().unwrap_err(), RunError::Cancelled);
    assert_eq!(outcome.uploaded, 10);
    assert_eq!(h.store.len(), 0);
    assert!(h.orchestrator.state().error.is_none());
}

// ============================================================================
// Queue management
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_queue_for_sync_launches_background_run() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 4));

    assert!(h.orchestrator.queue_for_sync().await.unwrap());
    eventually(|| !h.orchestrator.is_running()).await;

    assert_eq!(h.store.len(), 0);
    assert!(h.orchestrator.state().last_successful_sync.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_queue_for_sync_only_counts_when_offline_or_empty() {
    let h = Harness::new(Vec::new());
    assert!(!h.orchestrator.queue_for_sync().await.unwrap());

    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 4));
    h.connectivity.set_online(false);
    assert!(!h.orchestrator.queue_for_sync().await.unwrap());
    assert_eq!(h.orchestrator.state().queue_size, 4);
    assert_eq!(h.remote.upload_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_queue_discards_everything() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 12));

    assert_eq!(h.orchestrator.clear_queue().await.unwrap(), 12);
    assert_eq!(h.store.len(), 0);
    assert_eq!(h.orchestrator.state().queue_size, 0);
    // The slot is free again afterwards
    assert!(h.orchestrator.start_sync(false).await.is_ok());
}

// ============================================================================
// Download-only and metadata runs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_download_only_skips_upload() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 4));

    let outcome = h.orchestrator.start_download_only(false).await.unwrap();

    assert_eq!(
        outcome.phases,
        vec![
            SyncPhase::Initializing,
            SyncPhase::ValidatingConnection,
            SyncPhase::DownloadingUpdates,
            SyncPhase::Finalizing,
        ]
    );
    assert_eq!(outcome.received, 7);
    assert_eq!(h.remote.upload_calls(), 0);
    assert_eq!(h.store.len(), 4);
    assert_eq!(h.orchestrator.state().queue_size, 4);
}

#[tokio::test(start_paused = true)]
async fn test_download_only_failure_is_terminal() {
    let h = Harness::new(Vec::new());
    h.remote.fail_pulls(Fault::Http(502));

    let err = h.orchestrator.start_download_only(false).await.unwrap_err();

    assert_eq!(err.sync_error().map(|e| e.kind()), Some("server"));
    assert_eq!(h.orchestrator.state().failed_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_metadata_sync_pulls_metadata() {
    let h = Harness::new(Vec::new());

    let outcome = h.orchestrator.start_metadata_sync(false).await.unwrap();

    assert_eq!(
        outcome.phases,
        vec![
            SyncPhase::Initializing,
            SyncPhase::ValidatingConnection,
            SyncPhase::DownloadingMetadata,
            SyncPhase::Finalizing,
        ]
    );
    assert_eq!(outcome.received, 3);
    assert_eq!(h.remote.metadata_pulls(), 1);
    assert_eq!(h.remote.pulls(), 0);
}
