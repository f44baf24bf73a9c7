//! Sync state, phases and progress reporting
//!
//! The orchestrator is the only writer of [`SyncState`] and
//! [`DetailedSyncProgress`]; both are published through `tokio::sync::watch`
//! channels so observers always read the latest value without locking.
//!
//! ## Progress bands
//!
//! Each phase owns a slice of the 0-100 range:
//!
//! | Phase                 | Range  |
//! |-----------------------|--------|
//! | Initializing          | 0-5    |
//! | ValidatingConnection  | 5-10   |
//! | UploadingData         | 10-80  |
//! | DownloadingUpdates    | 80-95  |
//! | DownloadingMetadata   | 80-95  |
//! | Finalizing            | 95-100 |
//!
//! Within UploadingData, staging covers 10-20 and chunk uploads 20-80.
//! [`ProgressReporter`] clamps every update so the percentage never goes
//! down within a run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::SyncError;

// ============================================================================
// SyncPhase
// ============================================================================

/// Step of a sync run, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Initializing,
    ValidatingConnection,
    UploadingData,
    DownloadingUpdates,
    DownloadingMetadata,
    Finalizing,
}

impl SyncPhase {
    pub fn title(&self) -> &'static str {
        match self {
            SyncPhase::Initializing => "Preparing sync",
            SyncPhase::ValidatingConnection => "Checking connection",
            SyncPhase::UploadingData => "Uploading data",
            SyncPhase::DownloadingUpdates => "Downloading updates",
            SyncPhase::DownloadingMetadata => "Downloading metadata",
            SyncPhase::Finalizing => "Finishing",
        }
    }

    pub fn default_detail(&self) -> &'static str {
        match self {
            SyncPhase::Initializing => "Loading pending changes",
            SyncPhase::ValidatingConnection => "Verifying session and server availability",
            SyncPhase::UploadingData => "Sending pending changes to the server",
            SyncPhase::DownloadingUpdates => "Fetching changes made on the server",
            SyncPhase::DownloadingMetadata => "Fetching form and field definitions",
            SyncPhase::Finalizing => "Updating local records",
        }
    }

    /// Percentage range owned by this phase
    pub fn band(&self) -> (u8, u8) {
        match self {
            SyncPhase::Initializing => (0, 5),
            SyncPhase::ValidatingConnection => (5, 10),
            SyncPhase::UploadingData => (10, 80),
            SyncPhase::DownloadingUpdates | SyncPhase::DownloadingMetadata => (80, 95),
            SyncPhase::Finalizing => (95, 100),
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// Linear position `done / total` inside `[start, end]`
pub(crate) fn interpolate(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 || done >= total {
        return end;
    }
    let span = (end - start) as usize;
    start + (span * done / total) as u8
}

// ============================================================================
// DetailedSyncProgress
// ============================================================================

/// Snapshot of a run's progress as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedSyncProgress {
    pub run_id: Uuid,
    pub phase: SyncPhase,
    /// 0-100, never decreasing within a run
    pub overall_percentage: u8,
    pub phase_title: String,
    pub phase_detail: String,
    pub processed_items: Option<usize>,
    pub total_items: Option<usize>,
    /// Classified fault of a failed run, or of the attempt being retried
    pub error: Option<SyncError>,
    /// Countdown until the next automatic retry
    pub auto_retry_in: Option<Duration>,
}

impl DetailedSyncProgress {
    fn start(run_id: Uuid) -> Self {
        let phase = SyncPhase::Initializing;
        Self {
            run_id,
            phase,
            overall_percentage: 0,
            phase_title: phase.title().to_string(),
            phase_detail: phase.default_detail().to_string(),
            processed_items: None,
            total_items: None,
            error: None,
            auto_retry_in: None,
        }
    }
}

// ============================================================================
// SyncState
// ============================================================================

/// Long-lived sync bookkeeping, observable at any time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub is_running: bool,
    pub queue_size: usize,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Consecutive failed runs; reset on success
    pub failed_attempts: u32,
    pub error: Option<String>,
}

// ============================================================================
// ProgressReporter
// ============================================================================

/// Per-run writer of the progress channel
///
/// Remembers every phase entered so the run can report its phase sequence.
pub(crate) struct ProgressReporter<'a> {
    tx: &'a watch::Sender<Option<DetailedSyncProgress>>,
    current: DetailedSyncProgress,
    phases: Vec<SyncPhase>,
}

impl<'a> ProgressReporter<'a> {
    /// Starts a run in the Initializing phase at 0%
    pub(crate) fn start(tx: &'a watch::Sender<Option<DetailedSyncProgress>>, run_id: Uuid) -> Self {
        let reporter = Self {
            tx,
            current: DetailedSyncProgress::start(run_id),
            phases: vec![SyncPhase::Initializing],
        };
        reporter.publish();
        reporter
    }

    fn publish(&self) {
        self.tx.send_replace(Some(self.current.clone()));
    }

    fn raise(&mut self, percentage: u8) {
        self.current.overall_percentage = self.current.overall_percentage.max(percentage.min(100));
    }

    pub(crate) fn phases(&self) -> &[SyncPhase] {
        &self.phases
    }

    pub(crate) fn percentage(&self) -> u8 {
        self.current.overall_percentage
    }

    /// Enters `phase` at the start of its band
    pub(crate) fn enter(&mut self, phase: SyncPhase) {
        if self.current.phase != phase {
            self.phases.push(phase);
        }
        self.current.phase = phase;
        self.current.phase_title = phase.title().to_string();
        self.current.phase_detail = phase.default_detail().to_string();
        self.current.processed_items = None;
        self.current.total_items = None;
        self.current.auto_retry_in = None;
        self.current.error = None;
        self.raise(phase.band().0);
        self.publish();
    }

    /// Updates the detail line and item counters of the current phase
    pub(crate) fn advance(
        &mut self,
        percentage: u8,
        detail: impl Into<String>,
        processed: Option<usize>,
        total: Option<usize>,
    ) {
        self.current.phase_detail = detail.into();
        self.current.processed_items = processed;
        self.current.total_items = total;
        self.current.auto_retry_in = None;
        self.current.error = None;
        self.raise(percentage);
        self.publish();
    }

    /// Replaces only the detail line
    pub(crate) fn annotate(&mut self, detail: impl Into<String>) {
        self.current.phase_detail = detail.into();
        self.publish();
    }

    /// Shows the fault being retried and the countdown to the next attempt
    pub(crate) fn retrying(&mut self, error: SyncError, delay: Duration, detail: impl Into<String>) {
        self.current.phase_detail = detail.into();
        self.current.error = Some(error);
        self.current.auto_retry_in = Some(delay);
        self.publish();
    }

    /// Marks the run as done at 100%
    pub(crate) fn complete(&mut self, detail: impl Into<String>) {
        self.current.phase_detail = detail.into();
        self.current.auto_retry_in = None;
        self.current.error = None;
        self.raise(100);
        self.publish();
    }

    /// Keeps the last progress visible with the terminal fault attached
    pub(crate) fn fail(&mut self, error: SyncError) {
        self.current.phase_detail = error.to_string();
        self.current.error = Some(error);
        self.current.auto_retry_in = None;
        self.publish();
    }
}
