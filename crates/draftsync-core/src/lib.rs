//! draftsync Core - Domain types, ports and configuration
//!
//! This crate is the hexagonal core shared by every other draftsync crate:
//! - **Domain** - `DraftRecord` and its composite identity (`InstanceKey`, `FieldKey`)
//! - **Ports** - Traits the orchestrator consumes: `IDraftStore`, `IRemoteSyncClient`,
//!   `IConnectivityObserver`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains plain data with no I/O. Ports define the trait
//! boundaries whose implementations live in adapter crates
//! (`draftsync-cache`, `draftsync-remote`) or in test fakes.

pub mod config;
pub mod domain;
pub mod ports;
