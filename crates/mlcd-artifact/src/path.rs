//! Artifact paths within a run
//!
//! Provides [`ArtifactPath`], a validated relative path such as
//! `model/model.json` that addresses one artifact inside a run.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

/// Relative, `/`-separated path of an artifact inside a run
///
/// Segments are never empty, `.` or `..`, so a path can be joined onto a
/// storage root without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactPath(Vec<String>);

impl ArtifactPath {
    /// Create path from segments
    ///
    /// # Errors
    /// Returns error if there are no segments or any segment is invalid
    pub fn new<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self(segments))
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment (the file name)
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.last().map_or("", String::as_str)
    }

    /// Append a segment, returning new path
    ///
    /// # Errors
    /// Returns error if the segment is invalid
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut new = self.clone();
        new.0.push(segment);
        Ok(new)
    }

    /// Path relative to a filesystem root
    #[must_use]
    pub fn to_relative_path_buf(&self) -> PathBuf {
        self.0.iter().collect()
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    match segment {
        "" => Err(PathError::EmptySegment),
        "." | ".." => Err(PathError::Traversal(segment.to_string())),
        s if s.contains('\\') => Err(PathError::InvalidCharacter('\\')),
        _ => Ok(()),
    }
}

impl Display for ArtifactPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl FromStr for ArtifactPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if s.starts_with('/') {
            return Err(PathError::Absolute(s.to_string()));
        }
        Self::new(s.split('/'))
    }
}

impl TryFrom<String> for ArtifactPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactPath> for String {
    fn from(value: ArtifactPath) -> Self {
        value.to_string()
    }
}

/// Errors when constructing artifact paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// No segments
    #[error("artifact path is empty")]
    Empty,

    /// Empty segment (e.g. `model//file`)
    #[error("artifact path contains an empty segment")]
    EmptySegment,

    /// Absolute path
    #[error("artifact path must be relative: {0}")]
    Absolute(String),

    /// `.` or `..` segment
    #[error("artifact path segment not allowed: {0}")]
    Traversal(String),

    /// Forbidden character
    #[error("artifact path contains invalid character {0:?}")]
    InvalidCharacter(char),
}
