//! Batch ref updates over the global ref database.
//!
//! A caller that wants to move several refs together builds a
//! [`BatchRefUpdate`], executes it against a
//! [`GlobalRefDatabase`](refdb_global::GlobalRefDatabase), and asks the
//! classifier what happened:
//!
//! - success: every ref moved;
//! - [`BatchError::LockFailure`]: nothing moved, run the batch again
//!   (see [`retry_on_lock_failure`]);
//! - [`BatchError::Storage`]: a command was rejected or only some refs
//!   moved; surface it, do not retry blindly.
//!
//! # Modules
//!
//! - [`command`] — [`RefUpdateCommand`] and its write-once [`CommandResult`]
//! - [`batch`] — [`BatchRefUpdate`] and its execution
//! - [`classify`] — the outcome classifier
//! - [`retry`] — backoff-and-retry for lock failures
//! - [`error`] — [`BatchError`]

pub mod batch;
pub mod classify;
pub mod command;
pub mod error;
pub mod retry;

pub use batch::BatchRefUpdate;
pub use classify::{check_results, classify, BatchVerdict};
pub use command::{CommandResult, CommandType, RefUpdateCommand};
pub use error::{BatchError, BatchResult, CommandSummary, ParseCommandResultError};
pub use retry::{retry_on_lock_failure, RetryConfig};
