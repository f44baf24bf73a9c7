//! Domain error types
//!
//! Errors raised while constructing or parsing domain values such as
//! instance keys and field keys.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required identifier component was empty
    #[error("Empty identifier: {0}")]
    EmptyIdentifier(&'static str),

    /// A composite key string could not be parsed
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
