//! Domain entities
//!
//! - Drafts: pending field mutations and their composite identity
//! - Domain-specific error types

pub mod draft;
pub mod errors;

pub use draft::{DraftIdentity, DraftRecord, FieldKey, InstanceKey};
pub use errors::DomainError;
