//! Error types for the ref model.

use thiserror::Error;

/// Errors that can occur while building refs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefError {
    /// The ref name violates git ref naming rules.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidRefName { name: String, reason: String },
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
