use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Name of a project (one git repository) as seen by every replica.
///
/// All ref state in the global ref database is keyed by project first, so two
/// projects may hold refs with the same name without interfering.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectName(String);

impl ProjectName {
    /// Create a project name, rejecting empty names and names that would
    /// escape the repository root.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let trimmed = name.trim_end_matches(".git").trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(TypeError::InvalidProjectName {
                name,
                reason: "must not be empty".into(),
            });
        }
        if trimmed.starts_with('/') || trimmed.split('/').any(|c| c == ".." || c.is_empty()) {
            return Err(TypeError::InvalidProjectName {
                name,
                reason: "must be a relative path without empty or '..' components".into(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectName({})", self.0)
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProjectName {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectName> for String {
    fn from(name: ProjectName) -> Self {
        name.0
    }
}
