//! Connectivity watcher: automatic resume on reconnect and on queue growth

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use draftsync_core::ports::IDraftStore;
use draftsync_sync::watcher::ConnectivityWatcher;

use crate::common::{self, eventually, Harness};

fn spawn_watcher(h: &Harness, shutdown: &CancellationToken) -> tokio::task::JoinHandle<()> {
    ConnectivityWatcher::new(
        h.orchestrator.clone(),
        h.connectivity.as_ref(),
        h.store.as_ref(),
    )
    .spawn(shutdown.clone())
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_sync() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 8));
    h.connectivity.set_online(false);
    let shutdown = CancellationToken::new();
    let watcher = spawn_watcher(&h, &shutdown);

    // Nothing happens while offline
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.remote.upload_calls(), 0);
    assert_eq!(h.store.len(), 8);

    h.connectivity.set_online(true);
    eventually(|| h.store.len() == 0).await;
    eventually(|| !h.orchestrator.is_running()).await;

    shutdown.cancel();
    watcher.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_new_draft_triggers_sync_when_online() {
    let h = Harness::new(Vec::new());
    let shutdown = CancellationToken::new();
    let watcher = spawn_watcher(&h, &shutdown);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let key = common::instance("ouA");
    for draft in common::drafts_for(&key, 2) {
        h.store.upsert(&draft).await.unwrap();
    }

    eventually(|| h.remote.upload_calls() > 0 && h.store.len() == 0).await;

    shutdown.cancel();
    watcher.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_poll_interval_retries_after_failure() {
    let key = common::instance("ouA");
    let h = Harness::new(common::drafts_for(&key, 3));
    h.remote.set_authenticated(false);
    let shutdown = CancellationToken::new();
    let watcher = ConnectivityWatcher::new(
        h.orchestrator.clone(),
        h.connectivity.as_ref(),
        h.store.as_ref(),
    )
    .with_poll_interval(Duration::from_secs(300))
    .spawn(shutdown.clone());

    // Startup run fails on the missing session
    eventually(|| h.orchestrator.state().failed_attempts == 1).await;
    assert_eq!(h.store.len(), 3);

    h.remote.set_authenticated(true);
    tokio::time::sleep(Duration::from_secs(301)).await;
    eventually(|| h.store.len() == 0).await;

    shutdown.cancel();
    watcher.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_watcher_stops_on_shutdown() {
    let h = Harness::new(Vec::new());
    let shutdown = CancellationToken::new();
    let watcher = spawn_watcher(&h, &shutdown);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), watcher)
        .await
        .expect("watcher did not stop")
        .unwrap();
}
