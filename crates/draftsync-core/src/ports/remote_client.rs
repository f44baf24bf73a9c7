//! Remote sync client port (driven/secondary port)
//!
//! Interface to the remote system of record. The orchestrator stages drafts
//! into the client's local working set, uploads them chunk by chunk, pulls
//! remote updates and probes liveness.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result`; faults are classified by the orchestrator's
//!   error classifier. Adapters should attach a [`RemoteFault`] to their
//!   errors so classification does not have to fall back to message text.
//! - `upload_staged` receives the exact chunk being uploaded. Every draft of
//!   the chunk not listed in [`UploadOutcome::rejected`] counts as accepted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DraftIdentity, DraftRecord};

// ============================================================================
// RemoteFault
// ============================================================================

/// Typed fault raised by remote client adapters
///
/// Carried inside `anyhow::Error` so that it survives `.context(..)` layers
/// and can be found again by walking the error chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteFault {
    /// The remote answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The connection was aborted or reset mid-request
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The host could not be resolved or reached
    #[error("Host unreachable: {0}")]
    Unreachable(String),

    /// No usable session or credential
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A fault wrapped by a client SDK, with the nested cause as text
    #[error("{message}")]
    Sdk {
        message: String,
        cause: Option<String>,
    },
}

impl RemoteFault {
    /// Returns the HTTP status carried by this fault, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteFault::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of uploading one chunk of staged drafts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// Values newly created on the remote side
    pub imported: u32,
    /// Values that replaced an existing remote value
    pub updated: u32,
    /// Values the remote accepted without change
    pub ignored: u32,
    /// Drafts the remote refused; these stay queued
    pub rejected: Vec<DraftIdentity>,
}

impl UploadOutcome {
    /// Outcome where every draft of the chunk was imported
    pub fn all_imported(count: usize) -> Self {
        Self {
            imported: count as u32,
            ..Self::default()
        }
    }

    /// Returns true if the remote refused the given draft
    pub fn is_rejected(&self, identity: &DraftIdentity) -> bool {
        self.rejected.iter().any(|r| r == identity)
    }
}

/// Summary of a pull of remote updates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSummary {
    /// Number of records or objects received
    pub received: u64,
}

// ============================================================================
// IRemoteSyncClient trait
// ============================================================================

/// Port trait for the remote system of record
#[async_trait::async_trait]
pub trait IRemoteSyncClient: Send + Sync {
    /// Returns true if an active session or credential is available
    async fn is_authenticated(&self) -> anyhow::Result<bool>;

    /// Performs one lightweight round trip to prove the remote is alive
    async fn probe_liveness(&self) -> anyhow::Result<()>;

    /// Empties the local working set; called before a run stages its drafts
    async fn discard_staged(&self) -> anyhow::Result<()>;

    /// Stages a draft into the client's local working set
    async fn stage_locally(&self, draft: &DraftRecord) -> anyhow::Result<()>;

    /// Uploads the given drafts as one batch
    ///
    /// Every draft must have been staged unchanged; the batch is refused
    /// otherwise.
    async fn upload_staged(&self, drafts: &[DraftRecord]) -> anyhow::Result<UploadOutcome>;

    /// Pulls data updates from the remote system
    async fn pull_updates(&self) -> anyhow::Result<PullSummary>;

    /// Pulls metadata (definitions) from the remote system
    async fn pull_metadata(&self) -> anyhow::Result<PullSummary>;
}
