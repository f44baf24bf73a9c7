//! Sync error taxonomy
//!
//! [`SyncError`] is the classified form of any fault raised during a run.
//! Progress and state only ever carry this type, never a raw fault string.
//! [`RunError`] is what a control operation returns when a run does not
//! complete successfully.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified synchronization fault
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    /// Connectivity problem (reset, unreachable host, offline)
    #[error("Network error: {message}")]
    Network {
        message: String,
        can_auto_retry: bool,
    },

    /// The remote refused the payload as malformed or unknown
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The remote failed while handling the request
    #[error("Server error ({status_code}): {message}")]
    Server { status_code: u16, message: String },

    /// An operation did not complete in time
    #[error("Timeout: {message}")]
    Timeout {
        message: String,
        can_auto_retry: bool,
    },

    /// The session is missing or was rejected
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Anything the classifier could not place
    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl SyncError {
    pub fn network(message: impl Into<String>) -> Self {
        SyncError::Network {
            message: message.into(),
            can_auto_retry: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        SyncError::Timeout {
            message: message.into(),
            can_auto_retry: true,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        SyncError::Unknown {
            message: message.into(),
        }
    }

    /// Returns true if the retry loop may retry this fault on its own
    pub fn can_auto_retry(&self) -> bool {
        match self {
            SyncError::Network { can_auto_retry, .. } => *can_auto_retry,
            SyncError::Timeout { can_auto_retry, .. } => *can_auto_retry,
            _ => false,
        }
    }

    /// Returns true if offering a "retry" action to the user makes sense
    pub fn allows_manual_retry(&self) -> bool {
        !matches!(
            self,
            SyncError::Authentication { .. } | SyncError::Validation { .. }
        )
    }

    /// Returns true if the user has to sign in again before syncing
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, SyncError::Authentication { .. })
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Network { .. } => "network",
            SyncError::Validation { .. } => "validation",
            SyncError::Server { .. } => "server",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Authentication { .. } => "authentication",
            SyncError::Unknown { .. } => "unknown",
        }
    }

    /// The human-readable message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            SyncError::Network { message, .. }
            | SyncError::Validation { message }
            | SyncError::Server { message, .. }
            | SyncError::Timeout { message, .. }
            | SyncError::Authentication { message }
            | SyncError::Unknown { message } => message,
        }
    }
}

/// Why a requested run did not complete successfully
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    /// Another run is active and `force` was not set
    #[error("A sync run is already active")]
    AlreadyRunning,

    /// The run was cancelled by the user or a forced restart
    #[error("Sync cancelled")]
    Cancelled,

    /// The run stopped on a classified fault
    #[error(transparent)]
    Failed(#[from] SyncError),
}

impl RunError {
    /// Returns the classified fault, if the run failed on one
    pub fn sync_error(&self) -> Option<&SyncError> {
        match self {
            RunError::Failed(err) => Some(err),
            _ => None,
        }
    }
}
