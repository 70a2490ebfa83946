//! Pipeline error taxonomy
//!
//! Every step surfaces its failure as a [`PipelineError`]. Missing inputs,
//! unreadable artifacts and policy violations are fatal for the run;
//! registry availability failures can be retried by the scheduler.

use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::deploy::DeployError;
use crate::metrics::MetricsError;
use crate::model::ModelError;
use crate::policy::{DecisionError, PolicyConfigError, PolicyViolation};
use mlcd_artifact::{ArtifactUri, RunId};
use mlcd_registry::{RegistryError, VersionRef};

/// Pipeline step errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Required data-file key absent or dataset unreadable
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Payload from the training step is missing or corrupted
    #[error("invalid training payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Archival of a production version failed; nothing was promoted
    #[error("failed to archive {version}, promotion aborted: {source}")]
    Archive {
        version: VersionRef,
        #[source]
        source: RegistryError,
    },

    /// Old versions were archived but the candidate was not promoted
    #[error("archived {archived:?} but failed to promote candidate: {source}")]
    Promote {
        archived: Vec<VersionRef>,
        #[source]
        source: RegistryError,
    },

    /// Promotion requested for a decision that does not promote
    #[error("decision does not promote the candidate (outcome: {0})")]
    NotPromotable(crate::policy::Outcome),

    /// Run record and payload disagree
    #[error("run {run_id} has no record matching {uri}")]
    UnknownRun { run_id: RunId, uri: ArtifactUri },

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl PipelineError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registry(e)
            | Self::Archive { source: e, .. }
            | Self::Promote { source: e, .. } => e.is_retryable(),
            Self::Dataset(e) => e.is_retryable(),
            Self::Deploy(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Both candidate and incumbent failed the quality floor
    #[must_use]
    pub fn policy_violation(&self) -> Option<&PolicyViolation> {
        match self {
            Self::Decision(DecisionError::Violation(v)) => Some(v),
            _ => None,
        }
    }

    /// Required input missing
    #[must_use]
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::Dataset(DatasetError::MissingInput { .. }))
    }
}

impl From<PolicyViolation> for PipelineError {
    fn from(value: PolicyViolation) -> Self {
        Self::Decision(value.into())
    }
}

impl From<PolicyConfigError> for PipelineError {
    fn from(value: PolicyConfigError) -> Self {
        Self::Config(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlcd_registry::ModelName;

    #[test]
    fn violation_is_detectable_and_fatal() {
        let err: PipelineError = PolicyViolation {
            best: 0.3,
            floor: 0.4,
            f1_new: 0.3,
            f1_incumbent: 0.0,
        }
        .into();
        assert!(err.policy_violation().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn archive_failure_inherits_retryability() {
        let version = VersionRef::new(ModelName::new("m").unwrap(), 1);
        let err = PipelineError::Archive {
            version,
            source: RegistryError::Unavailable("timeout".into()),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("failed to archive m/v1"));
    }

    #[test]
    fn missing_input_detected() {
        let err: PipelineError = DatasetError::MissingInput {
            key: "transformed_x_train_file".into(),
        }
        .into();
        assert!(err.is_missing_input());
        assert!(!err.is_retryable());
    }
}
