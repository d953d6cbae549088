//! Error taxonomy for batch ref updates.

use refdb_global::GlobalRefDbError;
use refdb_refs::RefError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandResult;

/// Terminal state of one command, kept on errors for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSummary {
    pub ref_name: String,
    pub result: CommandResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn describe(commands: &[CommandSummary]) -> String {
    let parts: Vec<String> = commands
        .iter()
        .map(|c| match &c.message {
            Some(m) => format!("{}: {} ({})", c.ref_name, c.result, m),
            None => format!("{}: {}", c.ref_name, c.result),
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

/// Errors from building, executing or classifying a batch ref update.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Every command failed on a lock or was aborted; nothing was applied.
    /// Re-running the whole batch is safe.
    #[error("update aborted with one or more lock failures: {}", describe(.commands))]
    LockFailure { commands: Vec<CommandSummary> },

    /// A command was rejected, or the batch applied only partially. The
    /// repository may need reconciliation; never retried automatically.
    #[error("{message}: {}", describe(.commands))]
    Storage {
        message: String,
        commands: Vec<CommandSummary>,
    },

    /// The batch was classified while a command still had no result.
    #[error("command for {ref_name} was never attempted")]
    Unresolved { ref_name: String },

    /// A result was set on a command that already had one.
    #[error("illegal result transition for {ref_name}: {from} -> {to}")]
    IllegalTransition {
        ref_name: String,
        from: CommandResult,
        to: CommandResult,
    },

    /// The batch already holds a command for this ref.
    #[error("duplicate command for {0}")]
    DuplicateRef(String),

    #[error(transparent)]
    InvalidRef(#[from] RefError),

    #[error(transparent)]
    GlobalRefDb(#[from] GlobalRefDbError),

    /// Retryable failures persisted past the configured attempts.
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<BatchError> },
}

impl BatchError {
    /// Whether re-running the same batch from scratch is safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockFailure { .. } => true,
            Self::GlobalRefDb(e) => e.is_lock_failure(),
            _ => false,
        }
    }

    /// The commands responsible for a lock or storage failure.
    pub fn commands(&self) -> &[CommandSummary] {
        match self {
            Self::LockFailure { commands } | Self::Storage { commands, .. } => commands,
            Self::RetriesExhausted { last, .. } => last.commands(),
            _ => &[],
        }
    }
}

/// Result alias for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// A string that does not name a [`CommandResult`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command result {0:?} (expected ok, lock-failure, rejected or aborted)")]
pub struct ParseCommandResultError(pub String);
