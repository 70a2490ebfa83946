//! Run identifiers
//!
//! Every training invocation gets a [`RunId`]. Artifacts and run records are
//! keyed by it, so a corrupted identifier is a fatal input error downstream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = RunIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RunIdError::Empty);
        }
        Ulid::from_string(trimmed)
            .map(Self)
            .map_err(|e| RunIdError::Malformed {
                input: trimmed.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Errors when parsing a run identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunIdError {
    /// Empty input
    #[error("run id is empty")]
    Empty,

    /// Not a valid ULID
    #[error("invalid run id '{input}': {reason}")]
    Malformed { input: String, reason: String },
}
