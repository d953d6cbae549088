//! Single ref update commands and their write-once results.

use std::fmt;
use std::str::FromStr;

use refdb_refs::{validate_ref_name, Ref, RefStorage};
use refdb_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{BatchError, BatchResult, CommandSummary, ParseCommandResultError};

/// Outcome of one command.
///
/// Starts as `NotAttempted` and moves exactly once to one of the terminal
/// states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandResult {
    NotAttempted,
    Ok,
    /// The ref lock was unavailable or the ref moved concurrently.
    LockFailure,
    /// Refused for a reason unrelated to locking.
    RejectedOtherReason,
    /// Not applied because another command of the atomic batch failed.
    Aborted,
}

impl CommandResult {
    pub fn is_terminal(self) -> bool {
        self != CommandResult::NotAttempted
    }

    /// Lock failures and aborts: terminal, with nothing applied.
    pub fn is_lock_failure_like(self) -> bool {
        matches!(self, CommandResult::LockFailure | CommandResult::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandResult::NotAttempted => "not-attempted",
            CommandResult::Ok => "ok",
            CommandResult::LockFailure => "lock-failure",
            CommandResult::RejectedOtherReason => "rejected",
            CommandResult::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandResult {
    type Err = ParseCommandResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "not-attempted" => Ok(CommandResult::NotAttempted),
            "ok" => Ok(CommandResult::Ok),
            "lock-failure" | "lock" => Ok(CommandResult::LockFailure),
            "rejected" | "rejected-other-reason" => Ok(CommandResult::RejectedOtherReason),
            "aborted" => Ok(CommandResult::Aborted),
            _ => Err(ParseCommandResultError(s.to_string())),
        }
    }
}

/// What a command does to its ref, derived from its old and new ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandType {
    Create,
    Update,
    Delete,
}

/// Request to move one ref from `old_id` to `new_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdateCommand {
    ref_name: String,
    old_id: ObjectId,
    new_id: ObjectId,
    result: CommandResult,
    message: Option<String>,
}

impl RefUpdateCommand {
    /// Create a command. A zero `old_id` creates the ref, a zero `new_id`
    /// deletes it.
    pub fn new(ref_name: impl Into<String>, old_id: ObjectId, new_id: ObjectId) -> BatchResult<Self> {
        let ref_name = ref_name.into();
        validate_ref_name(&ref_name)?;
        Ok(Self {
            ref_name,
            old_id,
            new_id,
            result: CommandResult::NotAttempted,
            message: None,
        })
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    pub fn old_id(&self) -> ObjectId {
        self.old_id
    }

    pub fn new_id(&self) -> ObjectId {
        self.new_id
    }

    pub fn result(&self) -> CommandResult {
        self.result
    }

    /// Detail recorded with the result, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn command_type(&self) -> CommandType {
        match (self.old_id.is_zero(), self.new_id.is_zero()) {
            (true, _) => CommandType::Create,
            (false, true) => CommandType::Delete,
            (false, false) => CommandType::Update,
        }
    }

    /// The value the ref must currently hold: the null ref for creations.
    pub fn expected_ref(&self) -> Ref {
        if self.old_id.is_zero() {
            Ref::null()
        } else {
            Ref::object(&self.ref_name, self.old_id, RefStorage::Loose)
        }
    }

    /// The value to store.
    pub fn desired_ref(&self) -> Ref {
        Ref::new_ref(&self.ref_name, self.new_id)
    }

    /// Record the terminal result. Fails if a result was already recorded
    /// or `result` is not terminal.
    pub fn set_result(&mut self, result: CommandResult, message: Option<String>) -> BatchResult<()> {
        if self.result.is_terminal() || !result.is_terminal() {
            return Err(BatchError::IllegalTransition {
                ref_name: self.ref_name.clone(),
                from: self.result,
                to: result,
            });
        }
        self.result = result;
        self.message = message;
        Ok(())
    }

    /// Abort a command that was never attempted.
    pub fn abort(&mut self) -> BatchResult<()> {
        self.set_result(CommandResult::Aborted, Some("transaction aborted".into()))
    }

    pub fn summary(&self) -> CommandSummary {
        CommandSummary {
            ref_name: self.ref_name.clone(),
            result: self.result,
            message: self.message.clone(),
        }
    }
}
