//! Promotion executor
//!
//! Replaces the production model of a model name with a candidate:
//! 1. Load the candidate and check it decodes
//! 2. Enumerate every Production version and archive each (fail-fast)
//! 3. Re-register the candidate under the production artifact path and
//!    promote the new version
//!
//! The whole sequence runs under the model name's [`PromotionLocks`] entry,
//! so two executors sharing a lock table never interleave. Each step is safe
//! to re-run: archival is idempotent and re-registering identical bytes is
//! accepted. A retry after a completed promotion registers one more version
//! (at-least-once promotion).

use crate::error::PipelineError;
use crate::lock::PromotionLocks;
use crate::model::TrainedModel;
use crate::payload::TrainingOutput;
use crate::policy::{Outcome, PromotionDecision};
use mlcd_artifact::{ArtifactPath, ArtifactUri, PathError, RunId};
use mlcd_registry::{ModelName, RegistryClient, RegistryError, VersionRef};
use serde::Serialize;

/// Artifact path the promoted model is re-registered under
pub const PRODUCTION_ARTIFACT_PATH: &str = "production_model/model.json";

/// Parsed [`PRODUCTION_ARTIFACT_PATH`]
///
/// # Errors
/// Never fails for the built-in constant
pub fn production_artifact_path() -> Result<ArtifactPath, PathError> {
    PRODUCTION_ARTIFACT_PATH.parse()
}

/// What a promotion changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionReceipt {
    /// Versions moved from Production to Archived, ascending
    pub archived: Vec<VersionRef>,
    /// Newly registered production version
    pub promoted: VersionRef,
    /// Artifact the new version is bound to
    pub artifact: ArtifactUri,
}

/// Performs the registry mutations of a promotion
#[derive(Debug, Clone)]
pub struct PromotionExecutor {
    client: RegistryClient,
    locks: PromotionLocks,
}

impl PromotionExecutor {
    /// Create executor with its own lock table
    #[must_use]
    pub fn new(client: RegistryClient) -> Self {
        Self::with_locks(client, PromotionLocks::new())
    }

    /// Create executor sharing a lock table with other executors
    #[must_use]
    pub fn with_locks(client: RegistryClient, locks: PromotionLocks) -> Self {
        Self { client, locks }
    }

    /// Registry client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    /// Lock table
    #[inline]
    #[must_use]
    pub fn locks(&self) -> &PromotionLocks {
        &self.locks
    }

    /// Promote only if `decision` says so
    ///
    /// # Errors
    /// - `PipelineError::NotPromotable` for a `keep_incumbent` decision
    /// - anything [`PromotionExecutor::execute`] returns
    pub async fn execute_decision(
        &self,
        decision: &PromotionDecision,
        payload: &TrainingOutput,
        name: &ModelName,
    ) -> Result<PromotionReceipt, PipelineError> {
        match decision.outcome {
            Outcome::PromoteNew => self.execute(payload, name).await,
            Outcome::KeepIncumbent => Err(PipelineError::NotPromotable(decision.outcome)),
        }
    }

    /// Archive the current production versions and promote the candidate
    ///
    /// # Errors
    /// - `PipelineError::InvalidPayload` if the payload is inconsistent
    /// - `PipelineError::Archive` if an archival fails; nothing is promoted
    /// - `PipelineError::Registry` if the candidate cannot be loaded
    /// - `PipelineError::Promote` if promotion fails after archival
    pub async fn execute(
        &self,
        payload: &TrainingOutput,
        name: &ModelName,
    ) -> Result<PromotionReceipt, PipelineError> {
        payload.validate()?;
        let _guard = self.locks.acquire(name).await;
        let run_id = payload.run_id;

        // the candidate must decode before anything is archived
        let _model: TrainedModel = self
            .client
            .load_artifact(run_id, payload.artifact_path())
            .await?;
        let bytes = self
            .client
            .fetch_artifact(run_id, payload.artifact_path())
            .await?
            .bytes()
            .to_vec();

        let current = self.client.production_versions(name).await?;
        if current.len() > 1 {
            tracing::warn!(
                model = %name,
                count = current.len(),
                "multiple production versions found"
            );
        }

        let mut archived = Vec::with_capacity(current.len());
        for version in current {
            match self.client.archive(&version).await {
                Ok(_) => archived.push(version),
                Err(source) => {
                    tracing::error!(
                        version = %version,
                        error = %source,
                        "archival failed, aborting promotion"
                    );
                    return Err(PipelineError::Archive { version, source });
                }
            }
        }

        let production_path = production_artifact_path()
            .map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
        let promoted = match self.register(run_id, &production_path, bytes, name).await {
            Ok(promoted) => promoted,
            Err(source) => {
                tracing::error!(
                    archived = ?archived,
                    error = %source,
                    "promotion failed after archival"
                );
                return Err(PipelineError::Promote { archived, source });
            }
        };

        let live = self.client.production_versions(name).await?;
        if live.len() != 1 {
            tracing::warn!(
                model = %name,
                live = ?live,
                "unexpected production count after promotion"
            );
        }

        tracing::info!(
            model = %name,
            promoted = %promoted,
            archived = archived.len(),
            "promotion complete"
        );
        Ok(PromotionReceipt {
            archived,
            promoted,
            artifact: ArtifactUri::new(run_id, production_path),
        })
    }

    async fn register(
        &self,
        run_id: RunId,
        path: &ArtifactPath,
        bytes: Vec<u8>,
        name: &ModelName,
    ) -> Result<VersionRef, RegistryError> {
        self.client.ensure_artifact(run_id, path, bytes).await?;
        self.client.promote(run_id, path, name).await
    }
}
