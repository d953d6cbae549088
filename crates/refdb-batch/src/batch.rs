//! Batches of ref update commands executed as one intent.

use refdb_global::GlobalRefDatabase;
use refdb_types::{ObjectId, ProjectName};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{check_results, classify, BatchVerdict};
use crate::command::{CommandResult, RefUpdateCommand};
use crate::error::{BatchError, BatchResult};

/// An ordered set of ref updates meant to apply all together or not at all.
///
/// The backing store does not guarantee atomicity across refs; the outcome
/// classifier tells afterwards whether it held.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRefUpdate {
    commands: Vec<RefUpdateCommand>,
}

impl BatchRefUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Each ref may appear once per batch.
    pub fn add(&mut self, command: RefUpdateCommand) -> BatchResult<&mut Self> {
        if self.commands.iter().any(|c| c.ref_name() == command.ref_name()) {
            return Err(BatchError::DuplicateRef(command.ref_name().to_string()));
        }
        self.commands.push(command);
        Ok(self)
    }

    /// Build and append a command moving `ref_name` from `old_id` to `new_id`.
    pub fn add_update(
        &mut self,
        ref_name: impl Into<String>,
        old_id: ObjectId,
        new_id: ObjectId,
    ) -> BatchResult<&mut Self> {
        self.add(RefUpdateCommand::new(ref_name, old_id, new_id)?)
    }

    pub fn commands(&self) -> &[RefUpdateCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn ref_names(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.ref_name().to_string()).collect()
    }

    /// Results in command order.
    pub fn results(&self) -> Vec<CommandResult> {
        self.commands.iter().map(RefUpdateCommand::result).collect()
    }

    /// Record the result of the command for `ref_name`.
    pub fn set_result(
        &mut self,
        ref_name: &str,
        result: CommandResult,
        message: Option<String>,
    ) -> BatchResult<()> {
        let command = self
            .commands
            .iter_mut()
            .find(|c| c.ref_name() == ref_name)
            .ok_or_else(|| BatchError::Unresolved {
                ref_name: ref_name.to_string(),
            })?;
        command.set_result(result, message)
    }

    /// Abort every command that has not been attempted. Returns how many
    /// were aborted.
    pub fn abort_remaining(&mut self) -> usize {
        let mut aborted = 0;
        for command in &mut self.commands {
            if !command.result().is_terminal() && command.abort().is_ok() {
                aborted += 1;
            }
        }
        aborted
    }

    /// The verdict for the current results.
    pub fn verdict(&self) -> BatchVerdict {
        classify(self.results())
    }

    /// Check the current results; see [`check_results`].
    pub fn check_results(&self) -> BatchResult<()> {
        check_results(&self.commands)
    }

    /// A copy of this batch with every result cleared, for another attempt.
    pub fn fresh_copy(&self) -> BatchResult<Self> {
        let mut copy = Self::new();
        for c in &self.commands {
            copy.add_update(c.ref_name(), c.old_id(), c.new_id())?;
        }
        Ok(copy)
    }

    /// Apply the batch through `db`.
    ///
    /// Locks every ref first, in lexicographic order. If any lock is
    /// unavailable, all commands end as `LockFailure` and nothing is
    /// applied. With the locks held, every command's expected value is
    /// checked; stale commands end as `LockFailure`, the others as
    /// `Aborted`, and nothing is applied. Otherwise commands run in order
    /// through compare-and-put; the first command that does not apply aborts
    /// the rest. Locks are released before returning.
    ///
    /// Fails only if the batch was already executed. Inspect the outcome
    /// with [`check_results`](Self::check_results).
    pub fn execute(&mut self, db: &dyn GlobalRefDatabase, project: &ProjectName) -> BatchResult<()> {
        if let Some(done) = self.commands.iter().find(|c| c.result().is_terminal()) {
            return Err(BatchError::IllegalTransition {
                ref_name: done.ref_name().to_string(),
                from: done.result(),
                to: CommandResult::NotAttempted,
            });
        }

        let mut locks = match db.lock_refs(project, &self.ref_names()) {
            Ok(locks) => locks,
            Err(e) if e.is_lock_failure() => {
                let reason = e.to_string();
                for command in &mut self.commands {
                    command.set_result(CommandResult::LockFailure, Some(reason.clone()))?;
                }
                return Ok(());
            }
            Err(e) => {
                let reason = e.to_string();
                for command in &mut self.commands {
                    command.set_result(CommandResult::RejectedOtherReason, Some(reason.clone()))?;
                }
                return Ok(());
            }
        };

        // No ref moves until every expectation holds.
        let mut stale = 0usize;
        for command in &mut self.commands {
            let (result, message) = match expectation_holds(db, project, command) {
                Ok(true) => continue,
                Ok(false) => (
                    CommandResult::LockFailure,
                    Some(format!("{} moved concurrently", command.ref_name())),
                ),
                Err(e) if e.is_lock_failure() => (CommandResult::LockFailure, Some(e.to_string())),
                Err(e) => (CommandResult::RejectedOtherReason, Some(e.to_string())),
            };
            debug!(%project, ref_name = command.ref_name(), %result, "expected value check failed");
            command.set_result(result, message)?;
            stale += 1;
        }
        if stale > 0 {
            let aborted = self.abort_remaining();
            debug!(%project, stale, aborted, "batch not applied");
            locks.release_all();
            return Ok(());
        }

        for i in 0..self.commands.len() {
            let command = &mut self.commands[i];
            let outcome = db.compare_and_put(project, &command.expected_ref(), &command.desired_ref());
            let (result, message) = match outcome {
                Ok(true) => (CommandResult::Ok, None),
                Ok(false) => (
                    CommandResult::LockFailure,
                    Some(format!("{} moved concurrently", command.ref_name())),
                ),
                Err(e) if e.is_lock_failure() => (CommandResult::LockFailure, Some(e.to_string())),
                Err(e) => (CommandResult::RejectedOtherReason, Some(e.to_string())),
            };
            debug!(%project, ref_name = command.ref_name(), %result, "ref update command executed");
            command.set_result(result, message)?;
            if result != CommandResult::Ok {
                let aborted = self.abort_remaining();
                if i > 0 || aborted > 0 {
                    warn!(%project, failed = self.commands[i].ref_name(), aborted, "atomic batch interrupted");
                }
                break;
            }
        }

        locks.release_all();
        Ok(())
    }

    /// [`execute`](Self::execute), then [`check_results`](Self::check_results).
    pub fn execute_checked(&mut self, db: &dyn GlobalRefDatabase, project: &ProjectName) -> BatchResult<()> {
        self.execute(db, project)?;
        self.check_results()
    }
}

/// Whether the stored value of the command's ref is still the one it expects.
///
/// A ref the global store has never seen counts as up to date, as
/// [`GlobalRefDatabase::is_up_to_date`] defines it.
fn expectation_holds(
    db: &dyn GlobalRefDatabase,
    project: &ProjectName,
    command: &RefUpdateCommand,
) -> refdb_global::Result<bool> {
    if command.old_id().is_zero() {
        Ok(!db.exists(project, command.ref_name()))
    } else {
        db.is_up_to_date(project, &command.expected_ref())
    }
}
