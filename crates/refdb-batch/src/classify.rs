//! Classification of a finished batch into success, retryable failure or
//! hard failure.
//!
//! Rules, first match wins:
//! 1. any `RejectedOtherReason` is a hard failure;
//! 2. some `Ok` next to some `LockFailure`/`Aborted` is a hard failure, since
//!    the batch applied partially;
//! 3. no `Ok` at all (only `LockFailure`/`Aborted`) is a retryable failure;
//! 4. otherwise every command is `Ok`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::{CommandResult, RefUpdateCommand};
use crate::error::{BatchError, BatchResult};

/// Overall outcome of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchVerdict {
    /// Every command applied.
    Success,
    /// Nothing applied; the batch can be retried as is.
    Retryable,
    /// Some refs moved and others did not.
    PartialFailure,
    /// At least one command was rejected.
    Rejected,
    /// Some command has no result yet.
    Unresolved,
}

impl BatchVerdict {
    pub fn is_hard_failure(self) -> bool {
        matches!(self, BatchVerdict::PartialFailure | BatchVerdict::Rejected)
    }
}

/// Classify a batch from the results of its commands.
pub fn classify<I>(results: I) -> BatchVerdict
where
    I: IntoIterator<Item = CommandResult>,
{
    let mut ok = 0usize;
    let mut lock_failed = 0usize;
    let mut rejected = 0usize;
    for result in results {
        match result {
            CommandResult::NotAttempted => return BatchVerdict::Unresolved,
            CommandResult::Ok => ok += 1,
            CommandResult::LockFailure | CommandResult::Aborted => lock_failed += 1,
            CommandResult::RejectedOtherReason => rejected += 1,
        }
    }

    if rejected > 0 {
        BatchVerdict::Rejected
    } else if ok > 0 && lock_failed > 0 {
        BatchVerdict::PartialFailure
    } else if lock_failed > 0 {
        BatchVerdict::Retryable
    } else {
        BatchVerdict::Success
    }
}

/// Turn the results of a finished batch into `Ok(())` or the matching error.
///
/// Retryable batches fail with [`BatchError::LockFailure`]; rejected and
/// partially applied batches fail with [`BatchError::Storage`]. Both carry
/// every command so callers can see which refs moved.
pub fn check_results(commands: &[RefUpdateCommand]) -> BatchResult<()> {
    let verdict = classify(commands.iter().map(RefUpdateCommand::result));
    let summaries = || commands.iter().map(RefUpdateCommand::summary).collect::<Vec<_>>();
    match verdict {
        BatchVerdict::Success => Ok(()),
        BatchVerdict::Retryable => Err(BatchError::LockFailure {
            commands: summaries(),
        }),
        BatchVerdict::Rejected => Err(BatchError::Storage {
            message: "update failed".into(),
            commands: summaries(),
        }),
        BatchVerdict::PartialFailure => {
            let applied: Vec<&str> = commands
                .iter()
                .filter(|c| c.result() == CommandResult::Ok)
                .map(RefUpdateCommand::ref_name)
                .collect();
            warn!(?applied, "batch ref update applied partially");
            Err(BatchError::Storage {
                message: "update partially applied".into(),
                commands: summaries(),
            })
        }
        BatchVerdict::Unresolved => {
            let ref_name = commands
                .iter()
                .find(|c| !c.result().is_terminal())
                .map(|c| c.ref_name().to_string())
                .unwrap_or_default();
            Err(BatchError::Unresolved { ref_name })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use refdb_types::ObjectId;
    use crate::command::CommandResult::{
        Aborted, LockFailure, Ok as Applied, RejectedOtherReason as Rejected,
    };

    fn batch(results: &[CommandResult]) -> Vec<RefUpdateCommand> {
        results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                let mut cmd = RefUpdateCommand::new(
                    format!("refs/heads/branch-{i}"),
                    ObjectId::from_raw([1; 20]),
                    ObjectId::from_raw([2; 20]),
                )
                .unwrap();
                cmd.set_result(*result, None).unwrap();
                cmd
            })
            .collect()
    }

    fn assert_hard_failure(results: &[CommandResult]) {
        let err = check_results(&batch(results)).unwrap_err();
        assert!(
            matches!(err, BatchError::Storage { .. }),
            "expected hard failure for {results:?}, got {err}"
        );
        assert!(!err.is_retryable());
    }

    fn assert_lock_failure(results: &[CommandResult]) {
        let err = check_results(&batch(results)).unwrap_err();
        assert!(
            matches!(err, BatchError::LockFailure { .. }),
            "expected lock failure for {results:?}, got {err}"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn all_ok_succeeds() {
        check_results(&batch(&[Applied])).unwrap();
        check_results(&batch(&[Applied, Applied, Applied])).unwrap();
    }

    #[test]
    fn empty_batch_succeeds() {
        check_results(&[]).unwrap();
    }

    #[test]
    fn rejection_always_fails_hard() {
        assert_hard_failure(&[Rejected]);
        assert_hard_failure(&[Applied, Rejected]);
        assert_hard_failure(&[LockFailure, Rejected]);
        assert_hard_failure(&[LockFailure, Applied, Rejected]);
        assert_hard_failure(&[Aborted, Rejected]);
    }

    #[test]
    fn only_lock_failures_are_retryable() {
        assert_lock_failure(&[LockFailure]);
        assert_lock_failure(&[Aborted]);
        assert_lock_failure(&[LockFailure, LockFailure]);
        assert_lock_failure(&[LockFailure, LockFailure, Aborted]);
    }

    #[test]
    fn partial_application_fails_hard() {
        assert_hard_failure(&[LockFailure, Applied]);
        assert_hard_failure(&[Applied, LockFailure]);
        assert_hard_failure(&[LockFailure, Aborted, Applied]);
        assert_hard_failure(&[Applied, Aborted]);
    }

    #[test]
    fn errors_carry_all_commands() {
        let err = check_results(&batch(&[Applied, LockFailure])).unwrap_err();
        let names: Vec<_> = err.commands().iter().map(|c| c.ref_name.as_str()).collect();
        assert_eq!(names, vec!["refs/heads/branch-0", "refs/heads/branch-1"]);
        assert!(err.to_string().contains("refs/heads/branch-1: lock-failure"));
    }

    #[test]
    fn unattempted_command_is_a_caller_error() {
        let mut cmds = batch(&[Applied]);
        cmds.push(
            RefUpdateCommand::new("refs/heads/late", ObjectId::zero(), ObjectId::from_raw([3; 20]))
                .unwrap(),
        );
        let err = check_results(&cmds).unwrap_err();
        assert!(matches!(err, BatchError::Unresolved { ref_name } if ref_name == "refs/heads/late"));
    }

    fn terminal_result() -> impl Strategy<Value = CommandResult> {
        prop_oneof![Just(Applied), Just(LockFailure), Just(Rejected), Just(Aborted)]
    }

    proptest! {
        #[test]
        fn rejection_dominates(mut results in prop::collection::vec(terminal_result(), 0..8), pos in 0usize..8) {
            let pos = pos.min(results.len());
            results.insert(pos, Rejected);
            prop_assert_eq!(classify(results), BatchVerdict::Rejected);
        }

        #[test]
        fn verdict_matches_counts(results in prop::collection::vec(terminal_result(), 1..10)) {
            let ok = results.iter().filter(|r| **r == Applied).count();
            let failed = results.iter().filter(|r| r.is_lock_failure_like()).count();
            let rejected = results.iter().filter(|r| **r == Rejected).count();
            let expected = if rejected > 0 {
                BatchVerdict::Rejected
            } else if ok > 0 && failed > 0 {
                BatchVerdict::PartialFailure
            } else if ok == 0 {
                BatchVerdict::Retryable
            } else {
                BatchVerdict::Success
            };
            prop_assert_eq!(classify(results.clone()), expected);
            prop_assert_eq!(check_results(&batch(&results)).is_ok(), expected == BatchVerdict::Success);
        }

        #[test]
        fn order_does_not_matter(results in prop::collection::vec(terminal_result(), 1..10)) {
            let mut reversed = results.clone();
            reversed.reverse();
            prop_assert_eq!(classify(results), classify(reversed));
        }
    }
}
