//! Automatic retry of actions that fail with retryable lock failures.

use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BatchError, BatchResult};

/// Backoff policy for retrying lock failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays. Values that are not finite
    /// keep the delay constant.
    pub multiplier: f64,
    /// Fraction of each delay randomized in either direction, `0.0..=1.0`.
    /// Values that are not finite disable jitter.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 20,
            max_backoff_ms: 1_000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        // NaN or infinite growth degrades to a constant delay.
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.max(1.0)
        } else {
            1.0
        };
        let ms = self.initial_backoff_ms as f64 * multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }

    fn jittered(&self, base: Duration) -> Duration {
        if !self.jitter.is_finite() {
            return base;
        }
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }
}

/// Run `action` until it succeeds, fails hard, or runs out of attempts.
///
/// `action` receives the 1-based attempt number. Only errors for which
/// [`BatchError::is_retryable`] holds are retried; anything else is returned
/// at once. When the last attempt still fails retryably the error is wrapped
/// in [`BatchError::RetriesExhausted`], which is not retryable.
pub fn retry_on_lock_failure<T, F>(config: &RetryConfig, mut action: F) -> BatchResult<T>
where
    F: FnMut(u32) -> BatchResult<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match action(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = config.jittered(config.backoff(attempt));
                warn!(attempt, max_attempts, ?delay, error = %e, "lock failure, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                warn!(attempts = attempt, error = %e, "lock failure, retries exhausted");
                return Err(BatchError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandResult;
    use crate::error::CommandSummary;

    fn instant() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }

    fn lock_failure() -> BatchError {
        BatchError::LockFailure {
            commands: vec![CommandSummary {
                ref_name: "refs/heads/master".into(),
                result: CommandResult::LockFailure,
                message: None,
            }],
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let c = RetryConfig::default();
        assert_eq!(c.backoff(1), Duration::from_millis(20));
        assert_eq!(c.backoff(2), Duration::from_millis(40));
        assert_eq!(c.backoff(3), Duration::from_millis(80));
        assert_eq!(c.backoff(20), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let c = RetryConfig {
            jitter: 0.5,
            ..Default::default()
        };
        for _ in 0..100 {
            let d = c.jittered(Duration::from_millis(100));
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn non_finite_settings_do_not_panic() {
        let c: RetryConfig = toml::from_str("jitter = nan\nmultiplier = inf").unwrap();
        assert!(c.jitter.is_nan());
        assert_eq!(c.jittered(Duration::from_millis(100)), Duration::from_millis(100));
        assert_eq!(c.backoff(1), Duration::from_millis(20));
        assert_eq!(c.backoff(4), Duration::from_millis(20));

        let c = RetryConfig {
            multiplier: f64::NAN,
            jitter: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(c.backoff(3), Duration::from_millis(20));
        assert_eq!(c.jittered(Duration::from_millis(40)), Duration::from_millis(40));
    }

    #[test]
    fn retries_until_success() {
        let mut calls = 0;
        let value = retry_on_lock_failure(&instant(), |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(lock_failure())
            } else {
                Ok(attempt)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn hard_failure_is_not_retried() {
        let mut calls = 0;
        let err = retry_on_lock_failure(&instant(), |_| -> BatchResult<()> {
            calls += 1;
            Err(BatchError::Storage {
                message: "update partially applied".into(),
                commands: vec![],
            })
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, BatchError::Storage { .. }));
    }

    #[test]
    fn exhaustion_becomes_hard_failure() {
        let mut calls = 0;
        let err = retry_on_lock_failure(&instant(), |_| -> BatchResult<()> {
            calls += 1;
            Err(lock_failure())
        })
        .unwrap_err();
        assert_eq!(calls, 3);
        assert!(!err.is_retryable());
        assert!(matches!(err, BatchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(err.commands()[0].ref_name, "refs/heads/master");
    }

    #[test]
    fn no_retry_runs_once() {
        let mut calls = 0;
        let _ = retry_on_lock_failure(&RetryConfig::no_retry(), |_| -> BatchResult<()> {
            calls += 1;
            Err(lock_failure())
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn parse_toml() {
        let c: RetryConfig = toml::from_str("max-attempts = 10\njitter = 0.0").unwrap();
        assert_eq!(c.max_attempts, 10);
        assert_eq!(c.initial_backoff_ms, 20);
        assert_eq!(c.jitter, 0.0);
    }
}
