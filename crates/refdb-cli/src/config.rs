use std::path::Path;

use anyhow::Context;
use refdb_batch::RetryConfig;
use refdb_global::GlobalRefDbConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration file.
///
/// ```toml
/// [global-ref-db]
/// enabled = true
/// lock-timeout-ms = 5000
///
/// [retry]
/// max-attempts = 5
/// initial-backoff-ms = 20
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RefDbConfig {
    pub global_ref_db: GlobalRefDbConfig,
    pub retry: RetryConfig,
}

impl RefDbConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
