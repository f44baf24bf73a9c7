//! Sync orchestrator
//!
//! The [`SyncOrchestrator`] reconciles the local draft queue with the remote
//! system of record. It decides when a run may start, batches drafts into
//! chunks, retries transient faults, publishes phase and progress updates,
//! and fails without losing data.
//!
//! ## Run Flow
//!
//! 1. **Initializing**: load drafts. An empty queue finishes immediately.
//! 2. **ValidatingConnection**: session present, connectivity validated,
//!    liveness probe answered.
//! 3. **UploadingData**: stage every draft, chunk the staged set, upload chunk
//!    by chunk with the shared [`RetryPolicy`]; drafts are deleted only after
//!    their chunk was accepted.
//! 4. **DownloadingUpdates**: best-effort pull of remote changes.
//! 5. **Finalizing**: bookkeeping, 100% progress, progress cleared after the
//!    grace period.
//!
//! ## Concurrency
//!
//! - At most one run exists at a time. The run slot is claimed with an
//!   atomic compare-and-swap and released by a drop guard inside the run
//!   task, so panics and watchdog expiry release it too.
//! - Every suspension point of a run is raced against the run's
//!   [`CancellationToken`] and the watchdog deadline. Store deletions and
//!   queue recounts are bounded by the deadline only; cancellation never
//!   interrupts them.
//! - [`SyncState`] and [`DetailedSyncProgress`] are written only here and
//!   published through `watch` channels.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use draftsync_core::config::SyncConfig;
use draftsync_core::domain::{DraftRecord, InstanceKey};
use draftsync_core::ports::{IConnectivityObserver, IDraftStore, IRemoteSyncClient, UploadOutcome};

use crate::chunker::{adaptive_chunk_size, chunk, ChunkingSettings};
use crate::classifier::classify;
use crate::error::{RunError, SyncError};
use crate::progress::{interpolate, DetailedSyncProgress, ProgressReporter, SyncPhase, SyncState};
use crate::retry::RetryPolicy;

/// Error text recorded in [`SyncState::error`] when a run is cancelled
pub const CANCELLED_BY_USER: &str = "cancelled by user";

// ============================================================================
// Settings
// ============================================================================

/// Tunables of the orchestrator, usually derived from [`SyncConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub chunking: ChunkingSettings,
    pub retry: RetryPolicy,
    /// Upper bound on a whole run
    pub watchdog_timeout: Duration,
    /// Timeout of one chunk upload attempt
    pub chunk_timeout: Duration,
    /// Timeout of the liveness probe
    pub validation_timeout: Duration,
    /// Timeout of a pull of updates or metadata
    pub download_timeout: Duration,
    /// How long the final 100% stays visible after a successful run
    pub progress_grace: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            chunking: ChunkingSettings::from_config(config),
            retry: RetryPolicy::from_config(config),
            watchdog_timeout: config.watchdog_timeout(),
            chunk_timeout: config.chunk_timeout(),
            validation_timeout: config.validation_timeout(),
            download_timeout: config.download_timeout(),
            progress_grace: config.progress_grace(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

// ============================================================================
// RunKind / SyncOutcome
// ============================================================================

/// What a run synchronizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "instance", rename_all = "snake_case")]
pub enum RunKind {
    /// Upload the whole queue, then pull updates
    Queue,
    /// Upload the drafts of one instance as a single batch
    Instance(InstanceKey),
    /// Pull remote updates without uploading
    DownloadOnly,
    /// Pull remote metadata
    Metadata,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Queue => write!(f, "queue"),
            RunKind::Instance(key) => write!(f, "instance {key}"),
            RunKind::DownloadOnly => write!(f, "download"),
            RunKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// Summary of a successfully completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub run_id: Uuid,
    pub kind: RunKind,
    /// Phases entered, in order
    pub phases: Vec<SyncPhase>,
    /// Drafts accepted by the remote and deleted locally
    pub uploaded: usize,
    /// Drafts the remote refused; they stay queued
    pub rejected: usize,
    /// Drafts that could not be staged; they stay queued
    pub skipped_staging: usize,
    /// Uploaded drafts edited or discarded meanwhile; a newer value stays queued
    pub superseded: usize,
    /// Number of upload batches sent
    pub chunks: usize,
    /// Automatic retries performed
    pub retries: u32,
    /// Every backoff waited, in order
    pub backoff_delays: Vec<Duration>,
    /// Records or objects received from the remote
    pub received: u64,
    /// Set when the best-effort download failed
    pub download_note: Option<String>,
    pub duration_ms: u64,
}

impl SyncOutcome {
    fn new(run_id: Uuid, kind: RunKind) -> Self {
        Self {
            run_id,
            kind,
            phases: Vec::new(),
            uploaded: 0,
            rejected: 0,
            skipped_staging: 0,
            superseded: 0,
            chunks: 0,
            retries: 0,
            backoff_delays: Vec::new(),
            received: 0,
            download_note: None,
            duration_ms: 0,
        }
    }
}

// ============================================================================
// Run plumbing
// ============================================================================

/// Handle on the run currently holding the slot
struct ActiveRun {
    run_id: Uuid,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cancellation and watchdog scope of one run
struct RunScope {
    run_id: Uuid,
    token: CancellationToken,
    deadline: Instant,
    watchdog: Duration,
}

impl RunScope {
    /// Awaits `fut` unless the run is cancelled or the watchdog fires first
    async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, RunError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RunError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(self.expired()),
            output = fut => Ok(output),
        }
    }

    /// Awaits `fut` until the watchdog fires; cancellation does not interrupt it
    async fn until_deadline<F: Future>(&self, fut: F) -> Result<F::Output, RunError> {
        tokio::time::timeout_at(self.deadline, fut)
            .await
            .map_err(|_| self.expired())
    }

    fn expired(&self) -> RunError {
        RunError::Failed(SyncError::Timeout {
            message: format!("Sync did not finish within {}s", self.watchdog.as_secs()),
            can_auto_retry: false,
        })
    }
}

/// Releases the run slot when the run task ends, however it ends
struct RunGuard {
    inner: Arc<Inner>,
    run_id: Uuid,
    finished: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        {
            let mut slot = self.inner.lock_active();
            if slot.as_ref().is_some_and(|active| active.run_id == self.run_id) {
                *slot = None;
            }
        }

        let finished = self.finished;
        if !finished {
            error!(run_id = %self.run_id, "Sync task aborted before completion");
        }
        self.inner.state_tx.send_modify(|state| {
            state.is_running = false;
            if !finished {
                state.failed_attempts += 1;
                state.error = Some("sync task aborted".to_string());
            }
        });
        self.inner.running.store(false, Ordering::Release);
    }
}

/// Maps a port fault into a run failure
fn failed(err: anyhow::Error) -> RunError {
    RunError::Failed(classify(&err))
}

/// Folds a `tokio::time::timeout` result into one error, labelled with `what`
fn within<T>(result: Result<anyhow::Result<T>, Elapsed>, what: &str) -> anyhow::Result<T> {
    match result {
        Ok(inner) => inner.with_context(|| what.to_string()),
        Err(elapsed) => Err(anyhow::Error::new(elapsed).context(what.to_string())),
    }
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    store: Arc<dyn IDraftStore>,
    remote: Arc<dyn IRemoteSyncClient>,
    connectivity: Arc<dyn IConnectivityObserver>,
    settings: SyncSettings,
    state_tx: watch::Sender<SyncState>,
    progress_tx: watch::Sender<Option<DetailedSyncProgress>>,
    /// Run slot; claimed by compare-and-swap
    running: AtomicBool,
    active: Mutex<Option<ActiveRun>>,
    /// Bumped on every run start; stale progress clears compare against it
    generation: AtomicU64,
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_state(&self, modify: impl FnOnce(&mut SyncState)) {
        self.state_tx.send_modify(modify);
    }

    fn is_online(&self) -> bool {
        self.connectivity.current().is_online()
    }

    async fn run(
        self: &Arc<Self>,
        scope: RunScope,
        kind: RunKind,
        generation: u64,
    ) -> Result<SyncOutcome, RunError> {
        let started = Instant::now();
        let mut progress = ProgressReporter::start(&self.progress_tx, scope.run_id);
        let mut outcome = SyncOutcome::new(scope.run_id, kind.clone());

        let result = match &kind {
            RunKind::Queue => self.sync_queue(&scope, &mut progress, &mut outcome).await,
            RunKind::Instance(key) => {
                self.sync_instance(key, &scope, &mut progress, &mut outcome)
                    .await
            }
            RunKind::DownloadOnly => {
                self.pull_only(SyncPhase::DownloadingUpdates, &scope, &mut progress, &mut outcome)
                    .await
            }
            RunKind::Metadata => {
                self.pull_only(SyncPhase::DownloadingMetadata, &scope, &mut progress, &mut outcome)
                    .await
            }
        };

        outcome.phases = progress.phases().to_vec();
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        let clear_immediately = matches!(kind, RunKind::Instance(_));

        match result {
            Ok(()) => {
                info!(
                    uploaded = outcome.uploaded,
                    rejected = outcome.rejected,
                    skipped = outcome.skipped_staging,
                    chunks = outcome.chunks,
                    retries = outcome.retries,
                    duration_ms = outcome.duration_ms,
                    "Sync run completed"
                );
                if clear_immediately {
                    self.progress_tx.send_replace(None);
                } else {
                    self.clear_progress_after_grace(generation);
                }
                Ok(outcome)
            }
            Err(RunError::Cancelled) => {
                info!("Sync run cancelled");
                let queue_size = self.recount(&scope).await;
                self.update_state(|state| {
                    state.error = Some(CANCELLED_BY_USER.to_string());
                    if let Some(size) = queue_size {
                        state.queue_size = size;
                    }
                });
                self.progress_tx.send_replace(None);
                Err(RunError::Cancelled)
            }
            Err(RunError::Failed(err)) => {
                warn!(error = %err, kind = err.kind(), "Sync run failed");
                let queue_size = self.recount(&scope).await;
                self.update_state(|state| {
                    state.failed_attempts += 1;
                    state.error = Some(err.to_string());
                    if let Some(size) = queue_size {
                        state.queue_size = size;
                    }
                });
                if clear_immediately {
                    self.progress_tx.send_replace(None);
                } else {
                    progress.fail(err.clone());
                }
                Err(RunError::Failed(err))
            }
            Err(other) => Err(other),
        }
    }

    /// Outstanding count, or `None` if the store fails or the watchdog fires
    async fn recount(&self, scope: &RunScope) -> Option<usize> {
        match scope.until_deadline(self.store.count()).await {
            Ok(Ok(size)) => Some(size),
            Ok(Err(err)) => {
                warn!(error = %format!("{err:#}"), "Failed to recount pending drafts");
                None
            }
            Err(_) => {
                warn!("Recount of pending drafts timed out");
                None
            }
        }
    }

    fn clear_progress_after_grace(self: &Arc<Self>, generation: u64) {
        let grace = self.settings.progress_grace;
        if grace.is_zero() {
            self.progress_tx.send_replace(None);
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // A newer run owns the progress channel now
            if inner.generation.load(Ordering::Acquire) == generation {
                inner.progress_tx.send_replace(None);
            }
        });
    }

    // ------------------------------------------------------------------------
    // Run bodies
    // ------------------------------------------------------------------------

    async fn sync_queue(
        &self,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), RunError> {
        let drafts = scope
            .guard(self.store.list_all())
            .await?
            .context("Failed to load pending drafts")
            .map_err(failed)?;
        let total = drafts.len();
        self.update_state(|state| state.queue_size = total);
        info!(drafts = total, "Loaded pending drafts");

        if drafts.is_empty() {
            self.finalize(scope, progress).await;
            return Ok(());
        }

        self.validate_connection(scope, progress).await?;

        progress.enter(SyncPhase::UploadingData);
        let staged = self.stage_drafts(scope, progress, drafts, outcome).await?;

        let failed_attempts = self.state_tx.borrow().failed_attempts;
        let size = adaptive_chunk_size(failed_attempts, &self.settings.chunking);
        let staged_total = staged.len();
        let chunks = chunk(staged, size);
        let chunk_count = chunks.len();
        outcome.chunks = chunk_count;
        info!(
            staged = staged_total,
            chunk_size = size,
            chunks = chunk_count,
            failed_attempts,
            "Uploading drafts in chunks"
        );

        let mut processed = 0;
        for (index, batch) in chunks.iter().enumerate() {
            let label = format!("chunk {}/{}", index + 1, chunk_count);
            progress.advance(
                interpolate(20, 80, index, chunk_count),
                format!("Uploading {label}"),
                Some(processed),
                Some(staged_total),
            );

            let result = self
                .upload_with_retry(scope, progress, batch, &label, outcome)
                .await?;
            self.remove_accepted(scope, batch, &result, outcome).await?;

            processed += batch.len();
            progress.advance(
                interpolate(20, 80, index + 1, chunk_count),
                format!("Uploaded {label}"),
                Some(processed),
                Some(staged_total),
            );
        }

        self.pull_updates_best_effort(scope, progress, outcome)
            .await?;
        self.finalize(scope, progress).await;
        Ok(())
    }

    async fn sync_instance(
        &self,
        key: &InstanceKey,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), RunError> {
        let drafts = scope
            .guard(self.store.list_for_instance(key))
            .await?
            .with_context(|| format!("Failed to load drafts of {key}"))
            .map_err(failed)?;
        info!(instance = %key, drafts = drafts.len(), "Loaded instance drafts");

        if drafts.is_empty() {
            self.finalize(scope, progress).await;
            return Ok(());
        }

        self.validate_connection(scope, progress).await?;

        progress.enter(SyncPhase::UploadingData);
        let staged = self.stage_drafts(scope, progress, drafts, outcome).await?;

        if !staged.is_empty() {
            let label = format!("instance {key}");
            outcome.chunks = 1;
            progress.advance(
                20,
                format!("Uploading {label}"),
                Some(0),
                Some(staged.len()),
            );
            let result = self
                .upload_with_retry(scope, progress, &staged, &label, outcome)
                .await?;
            self.remove_accepted(scope, &staged, &result, outcome).await?;
            progress.advance(
                80,
                format!("Uploaded {label}"),
                Some(staged.len()),
                Some(staged.len()),
            );
        }

        self.finalize(scope, progress).await;
        Ok(())
    }

    async fn pull_only(
        &self,
        phase: SyncPhase,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), RunError> {
        self.validate_connection(scope, progress).await?;

        progress.enter(phase);
        let pull = match phase {
            SyncPhase::DownloadingMetadata => self.remote.pull_metadata(),
            _ => self.remote.pull_updates(),
        };
        let attempt = scope
            .guard(tokio::time::timeout(self.settings.download_timeout, pull))
            .await?;
        let summary = within(attempt, phase.title()).map_err(failed)?;
        outcome.received = summary.received;
        let (_, end) = phase.band();
        progress.advance(
            end,
            format!("Received {} records", summary.received),
            None,
            None,
        );

        self.finalize(scope, progress).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    async fn validate_connection(
        &self,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<(), RunError> {
        progress.enter(SyncPhase::ValidatingConnection);

        let authenticated = scope
            .guard(self.remote.is_authenticated())
            .await?
            .context("Failed to check session")
            .map_err(failed)?;
        if !authenticated {
            return Err(RunError::Failed(SyncError::Authentication {
                message: "No active session; sign in again".to_string(),
            }));
        }

        if !self.is_online() {
            return Err(RunError::Failed(SyncError::network(
                "No validated internet connection",
            )));
        }

        let probe = scope
            .guard(tokio::time::timeout(
                self.settings.validation_timeout,
                self.remote.probe_liveness(),
            ))
            .await?;
        within(probe, "Server liveness check").map_err(failed)?;

        debug!("Connection validated");
        progress.advance(10, "Connection verified", None, None);
        Ok(())
    }

    /// Resets the remote working set, then stages drafts one by one; drafts
    /// that fail are left out of this run
    async fn stage_drafts(
        &self,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
        drafts: Vec<DraftRecord>,
        outcome: &mut SyncOutcome,
    ) -> Result<Vec<DraftRecord>, RunError> {
        let total = drafts.len();
        let mut staged = Vec::with_capacity(total);

        // Leftovers of an earlier failed or cancelled run
        scope
            .guard(self.remote.discard_staged())
            .await?
            .context("Failed to reset staged drafts")
            .map_err(failed)?;

        progress.advance(
            10,
            format!("Preparing {total} drafts"),
            Some(0),
            Some(total),
        );

        for (index, draft) in drafts.into_iter().enumerate() {
            match scope.guard(self.remote.stage_locally(&draft)).await? {
                Ok(()) => staged.push(draft),
                Err(err) => {
                    outcome.skipped_staging += 1;
                    warn!(
                        draft = %draft.identity(),
                        error = %format!("{err:#}"),
                        "Failed to stage draft; it stays queued"
                    );
                }
            }
            progress.advance(
                interpolate(10, 20, index + 1, total),
                format!("Prepared {}/{total} drafts", index + 1),
                Some(index + 1),
                Some(total),
            );
        }

        Ok(staged)
    }

    /// Uploads one batch, retrying transient faults with backoff
    async fn upload_with_retry(
        &self,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
        batch: &[DraftRecord],
        label: &str,
        outcome: &mut SyncOutcome,
    ) -> Result<UploadOutcome, RunError> {
        let policy = self.settings.retry;
        let mut attempt: u32 = 1;

        loop {
            let upload = scope
                .guard(tokio::time::timeout(
                    self.settings.chunk_timeout,
                    self.remote.upload_staged(batch),
                ))
                .await?;

            let err = match within(upload, &format!("Uploading {label}")) {
                Ok(result) => {
                    if attempt > 1 {
                        info!(batch = label, attempt, "Upload succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => err,
            };

            let classified = classify(&err);
            if !policy.should_retry(&classified, attempt) {
                warn!(
                    batch = label,
                    attempt,
                    error = %classified,
                    "Upload failed; giving up"
                );
                return Err(RunError::Failed(classified));
            }

            if !self.is_online() {
                warn!(batch = label, attempt, "Connection lost; not retrying");
                return Err(RunError::Failed(SyncError::network(format!(
                    "Connection lost while retrying {label}"
                ))));
            }

            let delay = policy.backoff_delay(attempt);
            outcome.retries += 1;
            outcome.backoff_delays.push(delay);
            warn!(
                batch = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %classified,
                "Transient upload failure, retrying"
            );
            progress.retrying(
                classified,
                delay,
                format!("Retrying {label} in {}s", delay.as_secs()),
            );

            scope.guard(tokio::time::sleep(delay)).await?;
            attempt += 1;
        }
    }

    /// Deletes every draft of `batch` the remote did not reject
    ///
    /// A draft edited while its chunk was in flight is not deleted: the
    /// remote confirmed the old value, not the one now queued.
    async fn remove_accepted(
        &self,
        scope: &RunScope,
        batch: &[DraftRecord],
        result: &UploadOutcome,
        outcome: &mut SyncOutcome,
    ) -> Result<(), RunError> {
        for draft in batch {
            let identity = draft.identity();
            if result.is_rejected(&identity) {
                outcome.rejected += 1;
                warn!(draft = %identity, "Remote rejected draft; it stays queued");
                continue;
            }
            let removed = scope
                .until_deadline(self.store.delete(draft))
                .await?
                .with_context(|| format!("Failed to delete uploaded draft {identity}"))
                .map_err(failed)?;
            if !removed {
                outcome.superseded += 1;
                info!(draft = %identity, "Draft edited during upload; newer value stays queued");
            }
            outcome.uploaded += 1;
        }
        Ok(())
    }

    /// Pulls remote updates; a failure only annotates the phase detail
    async fn pull_updates_best_effort(
        &self,
        scope: &RunScope,
        progress: &mut ProgressReporter<'_>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), RunError> {
        progress.enter(SyncPhase::DownloadingUpdates);

        let attempt = scope
            .guard(tokio::time::timeout(
                self.settings.download_timeout,
                self.remote.pull_updates(),
            ))
            .await?;

        match within(attempt, "Downloading updates") {
            Ok(summary) => {
                outcome.received = summary.received;
                progress.advance(
                    95,
                    format!("Received {} updates", summary.received),
                    None,
                    None,
                );
            }
            Err(err) => {
                let classified = classify(&err);
                warn!(error = %classified, "Download of updates failed; upload results kept");
                let note = format!("Updates not downloaded: {}", classified.message());
                progress.annotate(note.clone());
                outcome.download_note = Some(note);
            }
        }
        Ok(())
    }

    async fn finalize(&self, scope: &RunScope, progress: &mut ProgressReporter<'_>) {
        progress.enter(SyncPhase::Finalizing);
        let queue_size = self.recount(scope).await;
        self.update_state(|state| {
            state.last_successful_sync = Some(Utc::now());
            state.failed_attempts = 0;
            state.error = None;
            if let Some(size) = queue_size {
                state.queue_size = size;
            }
        });
        progress.complete("Sync complete");
    }
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Releases a slot claimed for a non-run operation
struct SlotRelease<'a>(&'a AtomicBool);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cheap, cloneable handle on the sync engine
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Creates an idle orchestrator over the three ports
    pub fn new(
        store: Arc<dyn IDraftStore>,
        remote: Arc<dyn IRemoteSyncClient>,
        connectivity: Arc<dyn IConnectivityObserver>,
        settings: SyncSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::default());
        let (progress_tx, _) = watch::channel(None);

        info!(
            chunk_size = settings.chunking.base,
            max_attempts = settings.retry.max_attempts,
            watchdog_secs = settings.watchdog_timeout.as_secs(),
            "Creating sync orchestrator"
        );

        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                connectivity,
                settings,
                state_tx,
                progress_tx,
                running: AtomicBool::new(false),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Latest sync state
    pub fn state(&self) -> SyncState {
        self.inner.state_tx.borrow().clone()
    }

    /// Latest progress, `None` when no run is being reported
    pub fn progress(&self) -> Option<DetailedSyncProgress> {
        self.inner.progress_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<DetailedSyncProgress>> {
        self.inner.progress_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Refreshes the queue size and starts a background run when possible
    ///
    /// Returns `true` if a run was launched. Does nothing while offline,
    /// while a run is active, or when the queue is empty.
    #[tracing::instrument(skip(self))]
    pub async fn queue_for_sync(&self) -> anyhow::Result<bool> {
        let count = self
            .inner
            .store
            .count()
            .await
            .context("Failed to count pending drafts")?;
        self.inner.update_state(|state| state.queue_size = count);

        if count == 0 || self.is_running() {
            return Ok(false);
        }
        if !self.inner.is_online() {
            debug!(count, "Offline; drafts stay queued");
            return Ok(false);
        }

        match self.launch(RunKind::Queue, false).await {
            // The run reports through state and progress
            Ok(_result) => Ok(true),
            Err(RunError::AlreadyRunning) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Runs a full sync of the queue and waits for it to finish
    ///
    /// With `force`, an active run is cancelled first.
    #[tracing::instrument(skip(self))]
    pub async fn start_sync(&self, force: bool) -> Result<SyncOutcome, RunError> {
        self.run_to_completion(RunKind::Queue, force).await
    }

    /// Uploads the drafts of one instance as a single batch
    #[tracing::instrument(skip(self))]
    pub async fn start_sync_for_instance(
        &self,
        key: InstanceKey,
        force: bool,
    ) -> Result<SyncOutcome, RunError> {
        self.run_to_completion(RunKind::Instance(key), force).await
    }

    /// Pulls remote updates without uploading
    #[tracing::instrument(skip(self))]
    pub async fn start_download_only(&self, force: bool) -> Result<SyncOutcome, RunError> {
        self.run_to_completion(RunKind::DownloadOnly, force).await
    }

    /// Pulls remote metadata
    #[tracing::instrument(skip(self))]
    pub async fn start_metadata_sync(&self, force: bool) -> Result<SyncOutcome, RunError> {
        self.run_to_completion(RunKind::Metadata, force).await
    }

    /// Cancels the active run and waits until it has stopped
    ///
    /// Chunks already uploaded stay deleted; the rest stays queued.
    /// Returns `false` if no run was active.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_sync(&self) -> bool {
        let cancelled = self.cancel_active().await;
        if cancelled {
            self.inner.progress_tx.send_replace(None);
        }
        cancelled
    }

    /// Discards every pending draft
    ///
    /// Refused while a run is active.
    #[tracing::instrument(skip(self))]
    pub async fn clear_queue(&self) -> Result<u64, RunError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RunError::AlreadyRunning);
        }
        let _release = SlotRelease(&self.inner.running);

        let removed = self
            .inner
            .store
            .delete_all()
            .await
            .context("Failed to discard pending drafts")
            .map_err(failed)?;
        self.inner.update_state(|state| state.queue_size = 0);
        info!(removed, "Discarded pending drafts");
        Ok(removed)
    }

    async fn run_to_completion(
        &self,
        kind: RunKind,
        force: bool,
    ) -> Result<SyncOutcome, RunError> {
        let result = self.launch(kind, force).await?;
        result.await.unwrap_or_else(|_| {
            Err(RunError::Failed(SyncError::unknown(
                "Sync task ended unexpectedly",
            )))
        })
    }

    /// Claims the run slot and spawns the run task
    async fn launch(
        &self,
        kind: RunKind,
        force: bool,
    ) -> Result<oneshot::Receiver<Result<SyncOutcome, RunError>>, RunError> {
        if force && self.cancel_active().await {
            info!("Cancelled active run for forced restart");
        }

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%kind, "Sync already running; request ignored");
            return Err(RunError::AlreadyRunning);
        }

        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let watchdog = self.inner.settings.watchdog_timeout;
        let scope = RunScope {
            run_id,
            token: token.clone(),
            deadline: Instant::now() + watchdog,
            watchdog,
        };
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;

        self.inner.update_state(|state| {
            state.is_running = true;
            state.last_sync_attempt = Some(Utc::now());
            state.error = None;
        });
        info!(%run_id, %kind, "Starting sync run");

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("sync_run", %run_id, %kind);

        let mut slot = self.inner.lock_active();
        let handle = tokio::spawn(
            async move {
                let mut guard = RunGuard {
                    inner: Arc::clone(&inner),
                    run_id,
                    finished: false,
                };
                let result = inner.run(scope, kind, generation).await;
                guard.finished = true;
                // Release the slot before the caller sees the result
                drop(guard);
                let _ = tx.send(result);
            }
            .instrument(span),
        );
        *slot = Some(ActiveRun {
            run_id,
            token,
            handle,
        });
        drop(slot);

        Ok(rx)
    }

    /// Cancels the run holding the slot, if any, and waits for it to stop
    async fn cancel_active(&self) -> bool {
        let active = self.inner.lock_active().take();
        let Some(active) = active else {
            return false;
        };

        info!(run_id = %active.run_id, "Cancelling sync run");
        active.token.cancel();
        if let Err(err) = active.handle.await {
            if err.is_panic() {
                error!(run_id = %active.run_id, "Sync task panicked during cancellation");
            }
        }
        true
    }
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("settings", &self.inner.settings)
            .field("running", &self.is_running())
            .finish()
    }
}
