//! Retry behavior of chunk uploads: backoff, bounds and timeouts

use std::time::Duration;

use draftsync_sync::{RunError, SyncError, SyncSettings};

use crate::common::{self, Fault, Harness, Step};

#[tokio::test(start_paused = true)]
async fn test_socket_timeout_then_success_waits_one_base_delay() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 10));
    h.remote
        .script([Step::Fail(Fault::SocketTimeout), Step::Accept]);
    let base = h.orchestrator.settings().retry.base_delay;

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(outcome.retries, 1);
    assert_eq!(outcome.backoff_delays, vec![base]);
    assert_eq!(outcome.uploaded, 10);
    assert_eq!(h.store.len(), 0);

    let times = h.remote.upload_times();
    assert_eq!(times.len(), 2);
    let waited = times[1] - times[0];
    assert!(waited >= base && waited < base + Duration::from_secs(1), "{waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_http_401_is_not_retried_and_keeps_drafts() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 120));
    h.remote.script([Step::Fail(Fault::Http(401))]);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    let sync_error = err.sync_error().expect("classified error").clone();
    assert!(matches!(sync_error, SyncError::Authentication { .. }));
    assert_eq!(h.remote.upload_calls(), 1);
    assert_eq!(h.store.len(), 120);

    let progress = h.orchestrator.progress().expect("progress retained");
    assert_eq!(progress.error, Some(sync_error));
    assert!(progress.auto_retry_in.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_at_max_attempts() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 10));
    h.remote.script([
        Step::Fail(Fault::Reset),
        Step::Fail(Fault::Reset),
        Step::Fail(Fault::Reset),
        Step::Fail(Fault::Reset),
    ]);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    assert_eq!(err.sync_error().map(SyncError::kind), Some("network"));
    assert_eq!(h.remote.upload_calls(), 3);
    assert_eq!(h.store.len(), 10);
    assert_eq!(h.orchestrator.state().failed_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 10));
    h.remote.script([
        Step::Fail(Fault::SocketTimeout),
        Step::Fail(Fault::SocketTimeout),
        Step::Accept,
    ]);

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(
        outcome.backoff_delays,
        vec![Duration::from_secs(2), Duration::from_secs(4)]
    );
    assert_eq!(outcome.retries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_going_offline_aborts_instead_of_waiting() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 10));
    h.remote.script([Step::FailOffline(Fault::Reset)]);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    match err {
        RunError::Failed(SyncError::Network { message, .. }) => {
            assert!(message.contains("Connection lost"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.remote.upload_calls(), 1);
    assert_eq!(h.store.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_chunk_timeout_is_retried() {
    let key = common::instance("ouA");
    let mut settings = SyncSettings::default();
    settings.chunk_timeout = Duration::from_secs(5);
    let h = Harness::with_settings(common::drafts_for(&key, 10), settings);
    h.remote.script([Step::Hang, Step::Accept]);

    let outcome = h.orchestrator.start_sync(false).await.expect("sync failed");

    assert_eq!(outcome.retries, 1);
    assert_eq!(h.remote.upload_calls(), 2);
    assert_eq!(h.store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_stops_a_stuck_run() {
    let key = common::instance("ouA");
    let mut settings = SyncSettings::default();
    settings.watchdog_timeout = Duration::from_secs(30);
    let h = Harness::with_settings(common::drafts_for(&key, 10), settings);
    h.remote.script([Step::Hang]);

    let err = h.orchestrator.start_sync(false).await.unwrap_err();

    match err {
        RunError::Failed(SyncError::Timeout { can_auto_retry, .. }) => {
            assert!(!can_auto_retry);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!h.orchestrator.is_running());
    assert!(!h.orchestrator.state().is_running);
    assert_eq!(h.store.len(), 10);

    // The slot is free again
    h.orchestrator.start_sync(false).await.expect("second sync failed");
    assert_eq!(h.store.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_bounds_a_hung_recount() {
    let key = common::instance("ouA");
    let mut settings = SyncSettings::default();
    settings.watchdog_timeout = Duration::from_secs(30);
    let h = Harness::with_settings(common::drafts_for(&key, 4), settings);
    h.store.hang_counts();

    let started = tokio::time::Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(31),
        h.orchestrator.start_sync(false),
    )
    .await
    .expect("run outlived the watchdog")
    .expect("upload itself succeeded");

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(outcome.uploaded, 4);
    assert_eq!(h.store.len(), 0);
    assert!(!h.orchestrator.is_running());
    assert!(!h.orchestrator.state().is_running);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_bounds_a_hung_recount_after_failure() {
    let key = common::instance("ouA");
    let mut settings = SyncSettings::default();
    settings.watchdog_timeout = Duration::from_secs(30);
    let h = Harness::with_settings(common::drafts_for(&key, 4), settings);
    h.store.hang_counts();
    h.remote.script([Step::Fail(Fault::Http(500))]);

    let err = tokio::time::timeout(
        Duration::from_secs(31),
        h.orchestrator.start_sync(false),
    )
    .await
    .expect("run outlived the watchdog")
    .unwrap_err();

    assert_eq!(err.sync_error().map(SyncError::kind), Some("server"));
    assert!(!h.orchestrator.is_running());
    assert_eq!(h.orchestrator.state().failed_attempts, 1);
    assert_eq!(h.store.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_bounds_a_hung_delete() {
    let key = common::instance("ouA");
    let mut settings = SyncSettings::default();
    settings.watchdog_timeout = Duration::from_secs(30);
    let h = Harness::with_settings(common::drafts_for(&key, 4), settings);
    h.store.hang_deletes();

    let err = tokio::time::timeout(
        Duration::from_secs(31),
        h.orchestrator.start_sync(false),
    )
    .await
    .expect("run outlived the watchdog")
    .unwrap_err();

    assert!(matches!(err, RunError::Failed(SyncError::Timeout { .. })));
    assert!(!h.orchestrator.is_running());
    assert_eq!(h.store.len(), 4);
}
