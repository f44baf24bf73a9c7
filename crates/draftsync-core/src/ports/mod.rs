//! Port definitions (hexagonal architecture interfaces)
//!
//! The orchestrator depends only on these traits; implementations live in
//! adapter crates or in test fakes.
//!
//! ## Ports Overview
//!
//! - [`IDraftStore`] - Durable queue of pending drafts
//! - [`IRemoteSyncClient`] - Remote system of record (stage, upload, pull, probe)
//! - [`IConnectivityObserver`] - Continuous network reachability signal

pub mod connectivity;
pub mod draft_store;
pub mod remote_client;

pub use connectivity::{ConnectivityStatus, IConnectivityObserver, LinkType};
pub use draft_store::IDraftStore;
pub use remote_client::{IRemoteSyncClient, PullSummary, RemoteFault, UploadOutcome};
