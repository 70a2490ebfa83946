//! Registry types
//!
//! Defines the entities the registry tracks:
//! - Lifecycle stages
//! - Model names and version references
//! - Model versions
//! - Run records

use chrono::{DateTime, Utc};
use mlcd_artifact::{ArtifactPath, ArtifactUri, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Tag key holding the source-control revision of a run
pub const GIT_REVISION_TAG: &str = "git_revision";

/// Param key holding the trained model's type name
pub const MODEL_TYPE_PARAM: &str = "model_type";

/// Lifecycle stage of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Registered, not staged
    #[default]
    None,
    /// Candidate under evaluation
    Staging,
    /// Serving traffic; at most one per model name
    Production,
    /// Retired
    Archived,
}

impl Stage {
    /// All stages, in lifecycle order
    pub const ALL: [Stage; 4] = [Stage::None, Stage::Staging, Stage::Production, Stage::Archived];

    /// Display name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::Archived => "Archived",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            "archived" => Ok(Self::Archived),
            _ => Err(RegistryError::InvalidStage(s.to_string())),
        }
    }
}

/// Registered model name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelName(String);

impl ModelName {
    /// Create model name
    ///
    /// # Errors
    /// Returns error if the name is empty after trimming
    pub fn new(name: impl AsRef<str>) -> Result<Self, RegistryError> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(RegistryError::InvalidModelName(name.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Name as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModelName {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelName> for String {
    fn from(value: ModelName) -> Self {
        value.0
    }
}

/// Reference to one version of a registered model
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    /// Model name
    pub name: ModelName,
    /// Version number (1-based, per name)
    pub version: u32,
}

impl VersionRef {
    /// Create version reference
    #[inline]
    #[must_use]
    pub fn new(name: ModelName, version: u32) -> Self {
        Self { name, version }
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.name, self.version)
    }
}

/// Registry entry binding a model name to one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Model name
    pub name: ModelName,
    /// Version number
    pub version: u32,
    /// Producing run
    pub run_id: RunId,
    /// Artifact path inside the run
    pub artifact_path: ArtifactPath,
    /// Current stage
    pub stage: Stage,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last stage transition time
    pub updated_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Reference to this version
    #[inline]
    #[must_use]
    pub fn version_ref(&self) -> VersionRef {
        VersionRef::new(self.name.clone(), self.version)
    }

    /// URI of the bound artifact
    #[inline]
    #[must_use]
    pub fn artifact_uri(&self) -> ArtifactUri {
        ArtifactUri::new(self.run_id, self.artifact_path.clone())
    }
}

/// Metadata of one training invocation; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier
    pub run_id: RunId,
    /// Experiment the run belongs to
    pub experiment: String,
    /// Location of the trained model
    pub artifact_uri: ArtifactUri,
    /// Logged parameters (algorithm type, hyperparameters)
    pub params: BTreeMap<String, String>,
    /// Tags (source revision, ...)
    pub tags: BTreeMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    /// Create run record
    #[must_use]
    pub fn new(experiment: impl Into<String>, artifact_uri: ArtifactUri) -> Self {
        Self {
            run_id: artifact_uri.run_id,
            experiment: experiment.into(),
            artifact_uri,
            params: BTreeMap::new(),
            tags: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Add logged parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Add tag
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Source-control revision, if tagged
    #[must_use]
    pub fn git_revision(&self) -> Option<&str> {
        self.tags.get(GIT_REVISION_TAG).map(String::as_str)
    }
}
