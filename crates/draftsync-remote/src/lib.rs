//! draftsync Remote - HTTP adapter for the remote system of record
//!
//! Provides the `IRemoteSyncClient` implementation used by the daemon and
//! the CLI:
//! - Bearer-token authenticated requests against a configurable base URL
//! - Chunked data value uploads with per-value rejection reporting
//! - Incremental pulls of data values and metadata
//! - Liveness probe and session check
//!
//! ## Modules
//!
//! - [`client`] - HTTP client and transport fault mapping
//! - [`provider`] - `IRemoteSyncClient` implementation
//! - [`wire`] - JSON payloads

pub mod client;
pub mod provider;
pub mod wire;

pub use client::RemoteClient;
pub use provider::HttpRemoteSyncClient;
