//! Error types for global ref database operations.

use refdb_refs::RefError;
use refdb_types::ProjectName;
use thiserror::Error;

/// Errors returned by a [`GlobalRefDatabase`](crate::GlobalRefDatabase).
///
/// Lock failures are kept apart from storage failures: the former may be
/// retried right away, the latter need operator attention.
#[derive(Debug, Error)]
pub enum GlobalRefDbError {
    /// A ref lock could not be obtained, through contention or because the
    /// backing store could not be reached for locking.
    #[error("unable to lock {ref_name} in project {project}: {reason}")]
    Lock {
        project: ProjectName,
        ref_name: String,
        reason: String,
    },

    /// The backing store failed or refused an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The expected and new values of a compare-and-put name different refs.
    #[error("ref name mismatch: expected {expected}, got {actual}")]
    RefNameMismatch { expected: String, actual: String },

    /// The ref name is not a valid git ref name.
    #[error(transparent)]
    InvalidRef(#[from] RefError),

    /// I/O error talking to the backing store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GlobalRefDbError {
    pub fn lock(project: &ProjectName, ref_name: &str, reason: impl Into<String>) -> Self {
        Self::Lock {
            project: project.clone(),
            ref_name: ref_name.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for lock failures, the only retryable kind.
    pub fn is_lock_failure(&self) -> bool {
        matches!(self, Self::Lock { .. })
    }
}

/// Convenience type alias for global ref database operations.
pub type Result<T> = std::result::Result<T, GlobalRefDbError>;
