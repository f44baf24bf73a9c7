//! Whole-queue sync runs: phases, chunking, acceptance and bookkeeping

use std::time::Duration;

use draftsync_core::domain::DraftRecord;
use draftsync_core::ports::IDraftStore;
use draftsync_sync::{RunError, SyncError, SyncPhase, SyncSettings};

use crate::common::{self, Fault, Harness, Step};

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_queue_finishes_immediately() {
    let h = Harness::new(Vec::new());

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(
        outcome.phases,
        vec![SyncPhase::Initializing, SyncPhase::Finalizing]
    );
    assert_eq!(outcome.uploaded, 0);
    assert_eq!(h.remote.upload_calls(), 0);

    let progress = h.orchestrator.progress().expect("final progress visible");
    assert_eq!(progress.overall_percentage, 100);
    assert_eq!(progress.phase, SyncPhase::Finalizing);

    let state = h.orchestrator.state();
    assert!(!state.is_running);
    assert_eq!(state.failed_attempts, 0);
    assert!(state.last_successful_sync.is_some());
    assert!(state.last_sync_attempt.is_some());

    // Cleared after the grace period
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(h.orchestrator.progress().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_120_drafts_upload_in_four_chunks_of_30() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 120);
    let h = Harness::new(drafts.clone());

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    let uploads = h.remote.uploads();
    assert_eq!(uploads.len(), 4);
    assert!(uploads.iter().all(|batch| batch.len() == 30));
    // Chunks follow queue order
    let flattened: Vec<_> = uploads.into_iter().flatten().collect();
    assert_eq!(flattened, common::identities(&drafts));

    assert_eq!(outcome.chunks, 4);
    assert_eq!(outcome.uploaded, 120);
    assert_eq!(outcome.retries, 0);
    assert_eq!(outcome.received, 7);
    assert_eq!(
        outcome.phases,
        vec![
            SyncPhase::Initializing,
            SyncPhase::ValidatingConnection,
            SyncPhase::UploadingData,
            SyncPhase::DownloadingUpdates,
            SyncPhase::Finalizing,
        ]
    );

    assert_eq!(h.store.len(), 0);
    assert_eq!(h.remote.pulls(), 1);
    let state = h.orchestrator.state();
    assert_eq!(state.queue_size, 0);
    assert_eq!(state.failed_attempts, 0);
    assert!(state.error.is_none());
}

// ============================================================================
// Data safety
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failure_at_chunk_three_keeps_remaining_drafts() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 120);
    let h = Harness::new(drafts.clone());
    h.remote
        .script([Step::Accept, Step::Accept, Step::Fail(Fault::Http(500))]);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Failed(SyncError::Server {
            status_code: 500,
            ..
        })
    ));
    // Chunks 1 and 2 are gone, chunks 3 and 4 are still queued
    let remaining = common::identities(&h.store.snapshot());
    assert_eq!(remaining, common::identities(&drafts[60..]));
    assert_eq!(h.remote.pulls(), 0);

    let state = h.orchestrator.state();
    assert_eq!(state.failed_attempts, 1);
    assert_eq!(state.queue_size, 60);
    assert!(state.error.unwrap().contains("500"));

    // Failed progress stays visible with the classified error
    tokio::time::sleep(Duration::from_secs(10)).await;
    let progress = h.orchestrator.progress().expect("progress retained");
    assert_eq!(progress.error.map(|e| e.kind()), Some("server"));
}

#[tokio::test(start_paused = true)]
async fn test_each_run_starts_with_empty_staging() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 40);
    let h = Harness::new(drafts.clone());
    h.remote.script([Step::Accept, Step::Fail(Fault::Http(500))]);

    h.orchestrator.start_sync(false).await.unwrap_err();
    assert_eq!(h.remote.staging_resets(), 1);

    // Remaining drafts are staged afresh and uploaded
    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");
    assert_eq!(h.remote.staging_resets(), 2);
    assert_eq!(outcome.uploaded, 10);
    assert_eq!(h.store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_drafts_stay_queued() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 10);
    let h = Harness::new(drafts.clone());
    let rejected = common::identities(&drafts[3..5]);
    h.remote.script([Step::Reject(rejected.clone())]);

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(outcome.uploaded, 8);
    assert_eq!(outcome.rejected, 2);
    assert_eq!(common::identities(&h.store.snapshot()), rejected);
    assert_eq!(h.orchestrator.state().queue_size, 2);
}

#[tokio::test(start_paused = true)]
async fn test_draft_edited_during_upload_stays_queued() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 3);
    let h = Harness::new(drafts.clone());
    let gate = h.remote.gate_uploads();

    let orchestrator = h.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.start_sync(false).await });
    h.remote.wait_for_uploads(1).await;

    let edited = DraftRecord::new(
        drafts[0].instance().clone(),
        drafts[0].field().clone(),
        "NEW",
    );
    h.store.upsert(&edited).await.unwrap();
    gate.notify_one();

    let outcome = run.await.unwrap().expect("sync failed");

    assert_eq!(h.remote.uploads(), vec![common::identities(&drafts)]);
    assert_eq!(outcome.uploaded, 3);
    assert_eq!(outcome.superseded, 1);
    assert_eq!(h.store.snapshot(), vec![edited]);
    assert_eq!(h.orchestrator.state().queue_size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_staging_failure_skips_draft_for_this_run() {
    let key = common::instance("ouA");
    let drafts = common::drafts_for(&key, 5);
    let h = Harness::new(drafts.clone());
    h.remote.fail_staging_of(drafts[2].identity());

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(outcome.skipped_staging, 1);
    assert_eq!(outcome.uploaded, 4);
    assert_eq!(h.remote.uploads()[0].len(), 4);
    assert_eq!(
        common::identities(&h.store.snapshot()),
        vec![drafts[2].identity()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_download_failure_is_best_effort() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 3));
    h.remote.fail_pulls(Fault::Http(503));

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(outcome.uploaded, 3);
    let note = outcome.download_note.expect("download note");
    assert!(note.contains("503"), "{note}");
    assert_eq!(h.orchestrator.state().failed_attempts, 0);
    assert_eq!(h.store.len(), 0);
}

// ============================================================================
// Connection validation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_offline_run_fails_with_network_error() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 3));
    h.connectivity.set_online(false);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    assert_eq!(err.sync_error().map(SyncError::kind), Some("network"));
    assert_eq!(h.remote.upload_calls(), 0);
    assert_eq!(h.store.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_missing_session_fails_with_authentication_error() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 3));
    h.remote.set_authenticated(false);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    let sync_error = err.sync_error().expect("classified error");
    assert!(sync_error.requires_reauthentication());
    assert!(!sync_error.allows_manual_retry());
    assert_eq!(h.remote.staged().len(), 0);
    assert_eq!(h.remote.staging_resets(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_liveness_probe_failure_aborts_before_staging() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 3));
    h.remote.fail_probe(Fault::Reset);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    assert_eq!(err.sync_error().map(SyncError::kind), Some("network"));
    assert!(h.remote.staged().is_empty());
    assert_eq!(h.store.len(), 3);
}

// ============================================================================
// Adaptive chunking
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_chunk_size_halves_after_failed_run() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 30));
    h.remote.script([Step::Fail(Fault::Http(400))]);

    h.orchestrator.start_sync(false).await.unwrap_err();
    assert_eq!(h.orchestrator.state().failed_attempts, 1);

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    // First run sent one chunk of 30; the second uses 15
    let sizes: Vec<usize> = h.remote.uploads().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![30, 15, 15]);
    assert_eq!(outcome.chunks, 2);
    assert_eq!(h.orchestrator.state().failed_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_size_follows_settings() {
    let key = common::instance("ouA");
    let mut settings = SyncSettings::default();
    settings.chunking.base = 10;
    let h = Harness::with_settings(common::drafts_for(&key, 25), settings);

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    let sizes: Vec<usize> = h.remote.uploads().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(outcome.chunks, 3);
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_progress_never_decreases_within_a_run() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 120));
    h.remote
        .script([Step::Accept, Step::Fail(Fault::SocketTimeout), Step::Accept]);

    let mut rx = h.orchestrator.subscribe_progress();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let Some(progress) = rx.borrow_and_update().clone() else {
                continue;
            };
            seen.push(progress.overall_percentage);
            if progress.overall_percentage == 100 {
                break;
            }
        }
        seen
    });

    h.orchestrator.start_sync(false).await.expect("sync failed");
    let seen = collector.await.unwrap();

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test(start_paused = true)]
async fn test_state_reports_running_during_run() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 3));
    let gate = h.remote.gate_uploads();

    let orchestrator = h.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.start_sync(false).await });
    h.remote.wait_for_uploads(1).await;

    let state = h.orchestrator.state();
    assert!(state.is_running);
    assert_eq!(state.queue_size, 3);
    let progress = h.orchestrator.progress().unwrap();
    assert_eq!(progress.phase, SyncPhase::UploadingData);
    assert_eq!(progress.total_items, Some(3));

    gate.notify_one();
    run.await.unwrap().expect("sync failed");
    assert!(!h.orchestrator.state().is_running);
    assert_eq!(h.store.count().await.unwrap(), 0);
}
