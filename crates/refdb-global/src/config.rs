use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the global ref database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GlobalRefDbConfig {
    /// When `false`, the replica runs alone and uses the no-op database.
    pub enabled: bool,
    /// Longest time `lock_ref` waits for a held lock, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for GlobalRefDbConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_timeout_ms: 5_000,
        }
    }
}

impl GlobalRefDbConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Same configuration with a different lock timeout.
    pub fn with_lock_timeout(self, timeout: Duration) -> Self {
        Self {
            lock_timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ..self
        }
    }
}
