//! Payload handed from the training step to validation and promotion

use crate::error::PipelineError;
use mlcd_artifact::{ArtifactPath, ArtifactUri, RunId};
use serde::{Deserialize, Serialize};

/// Output of the training step, passed verbatim to downstream steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingOutput {
    pub run_id: RunId,
    pub artifact_uri: ArtifactUri,
}

impl TrainingOutput {
    /// Create payload for an artifact
    #[must_use]
    pub fn new(artifact_uri: ArtifactUri) -> Self {
        Self {
            run_id: artifact_uri.run_id,
            artifact_uri,
        }
    }

    /// Parse a payload received from the scheduler
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidPayload` if the JSON is malformed or the
    /// run id disagrees with the artifact URI
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let payload: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
        payload.validate()?;
        Ok(payload)
    }

    /// Serialize for the scheduler
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidPayload` if serialization fails
    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string(self).map_err(|e| PipelineError::InvalidPayload(e.to_string()))
    }

    /// Check the run id and the URI refer to the same run
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidPayload` on mismatch
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.run_id == self.artifact_uri.run_id {
            Ok(())
        } else {
            Err(PipelineError::InvalidPayload(format!(
                "run id {} does not match artifact uri {}",
                self.run_id, self.artifact_uri
            )))
        }
    }

    /// Artifact path inside the run
    #[inline]
    #[must_use]
    pub fn artifact_path(&self) -> &ArtifactPath {
        &self.artifact_uri.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TrainingOutput {
        TrainingOutput::new(ArtifactUri::new(RunId::new(), "model/model.json".parse().unwrap()))
    }

    #[test]
    fn json_round_trip_is_verbatim() {
        let original = payload();
        let json = original.to_json().unwrap();
        assert_eq!(TrainingOutput::from_json(&json).unwrap(), original);
        assert!(json.contains("mlcd-artifacts:/"));
    }

    #[test]
    fn corrupted_run_id_rejected() {
        let mut value = serde_json::to_value(payload()).unwrap();
        value["run_id"] = serde_json::Value::String("not-a-ulid".into());
        let err = TrainingOutput::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
    }

    #[test]
    fn missing_field_rejected() {
        let err =
            TrainingOutput::from_json(r#"{"run_id":"01ARZ3NDEKTSV4RRFFQ69G5FAV"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPayload(_)));
    }

    #[test]
    fn mismatched_run_rejected() {
        let mut p = payload();
        p.run_id = RunId::new();
        assert!(matches!(
            TrainingOutput::from_json(&p.to_json().unwrap()),
            Err(PipelineError::InvalidPayload(_))
        ));
    }
}
