//! Pipeline steps
//!
//! `train` produces a [`TrainingOutput`] that the scheduler passes verbatim to
//! `validate` and `push`. `run` chains the three for a single invocation.

use crate::config::PipelineConfig;
use crate::dataset::{DataFiles, TEST_KEYS, TRAIN_KEYS};
use crate::error::PipelineError;
use crate::executor::{PromotionExecutor, PromotionReceipt};
use crate::metrics::PerformanceReport;
use crate::model::{Predictor, Trainer, TrainedModel};
use crate::payload::TrainingOutput;
use crate::policy::{PromotionDecision, PromotionPolicy};
use mlcd_artifact::{ArtifactPath, PathError, RunId};
use mlcd_registry::{
    ModelName, RegistryClient, RunRecord, VersionRef, GIT_REVISION_TAG, MODEL_TYPE_PARAM,
};
use serde::Serialize;
use std::time::Instant;
use tokio::process::Command;

/// Artifact path of a freshly trained model
pub const MODEL_ARTIFACT_PATH: &str = "model/model.json";

fn model_artifact_path() -> Result<ArtifactPath, PathError> {
    MODEL_ARTIFACT_PATH.parse()
}

/// Current source-control revision, empty when unavailable
pub async fn source_revision() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--verify", "HEAD"])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(out) => {
            tracing::debug!(status = %out.status, "git revision unavailable");
            String::new()
        }
        Err(e) => {
            tracing::debug!(error = %e, "git not available");
            String::new()
        }
    }
}

/// Fit a model, store it and record the run
///
/// # Errors
/// - `PipelineError::Dataset` if a training data-file key is missing or unreadable
/// - `PipelineError::Model` if fitting fails
/// - `PipelineError::Registry` if storing the artifact or the run record fails
pub async fn train(
    client: &RegistryClient,
    trainer: &dyn Trainer,
    data_files: &DataFiles,
    experiment: &str,
) -> Result<TrainingOutput, PipelineError> {
    data_files.require(&TRAIN_KEYS)?;
    let start = Instant::now();
    let dataset = data_files.load_train().await?;

    let run_id = RunId::new();
    tracing::info!(
        run_id = %run_id,
        experiment,
        trainer = trainer.name(),
        rows = dataset.len(),
        "training"
    );
    let model = trainer.fit(&dataset)?;

    let path = model_artifact_path().map_err(|e| PipelineError::InvalidPayload(e.to_string()))?;
    let uri = client.store_artifact(run_id, &path, &model).await?;

    let mut run = RunRecord::new(experiment, uri.clone())
        .with_param(MODEL_TYPE_PARAM, model.model_type())
        .with_tag(GIT_REVISION_TAG, source_revision().await);
    for (key, value) in trainer.params() {
        run = run.with_param(key, value);
    }
    client.record_run(run).await?;

    tracing::info!(
        run_id = %run_id,
        uri = %uri,
        elapsed_secs = crate::metrics::round3(start.elapsed().as_secs_f64()),
        "training complete"
    );
    Ok(TrainingOutput::new(uri))
}

/// Scores of the model currently in production
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncumbentReport {
    pub version: VersionRef,
    pub performance: PerformanceReport,
}

/// Outcome of the validation step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub candidate: PerformanceReport,
    /// `None` on cold start
    pub incumbent: Option<IncumbentReport>,
    pub decision: PromotionDecision,
}

/// Evaluate the candidate and the incumbent and apply the policy
///
/// # Errors
/// - `PipelineError::InvalidPayload` / `PipelineError::UnknownRun` for a bad payload
/// - `PipelineError::Dataset` if a test data-file key is missing or unreadable
/// - `PipelineError::Registry` if either model is unreadable; there is no fallback
/// - `PipelineError::Decision` if no model meets the floor
pub async fn validate(
    client: &RegistryClient,
    payload: &TrainingOutput,
    data_files: &DataFiles,
    name: &ModelName,
    policy: &PromotionPolicy,
) -> Result<ValidationReport, PipelineError> {
    payload.validate()?;
    data_files.require(&TEST_KEYS)?;

    match client.get_run(payload.run_id).await? {
        Some(run) if run.artifact_uri == payload.artifact_uri => {}
        _ => {
            return Err(PipelineError::UnknownRun {
                run_id: payload.run_id,
                uri: payload.artifact_uri.clone(),
            })
        }
    }

    let candidate: TrainedModel = client
        .load_artifact(payload.run_id, payload.artifact_path())
        .await?;

    tracing::info!("loading test data");
    let test = data_files.load_test().await?;

    let y_pred = candidate.predict(test.features())?;
    let candidate_report = PerformanceReport::evaluate("new model", test.labels(), &y_pred)?;

    let incumbent = match client.get_production_version(name).await? {
        Some(version) => {
            let entry = client.version(&version).await?;
            let model: TrainedModel = client
                .load_artifact(entry.run_id, &entry.artifact_path)
                .await?;
            tracing::info!(version = %version, "loaded production model");
            let y_pred = model.predict(test.features())?;
            let performance = PerformanceReport::evaluate("old model", test.labels(), &y_pred)?;
            Some(IncumbentReport {
                version,
                performance,
            })
        }
        None => {
            tracing::info!(model = %name, "there is no production model yet");
            None
        }
    };

    let decision = policy.decide(
        candidate_report.f1,
        incumbent.as_ref().map(|i| i.performance.f1),
    )?;

    Ok(ValidationReport {
        candidate: candidate_report,
        incumbent,
        decision,
    })
}

/// Promote the candidate
///
/// # Errors
/// See [`PromotionExecutor::execute`]
pub async fn push(
    executor: &PromotionExecutor,
    payload: &TrainingOutput,
    name: &ModelName,
) -> Result<PromotionReceipt, PipelineError> {
    executor.execute(payload, name).await
}

/// Everything one pipeline invocation did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub training: TrainingOutput,
    pub validation: ValidationReport,
    /// `None` when the incumbent was kept
    pub promotion: Option<PromotionReceipt>,
}

/// Train, validate, and promote when the policy says so
///
/// # Errors
/// The first failing step's error; later steps do not run
pub async fn run(
    executor: &PromotionExecutor,
    trainer: &dyn Trainer,
    config: &PipelineConfig,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let name = config.model()?;
    let client = executor.client();

    let training = train(client, trainer, &config.data_files, &config.experiment).await?;
    let validation = validate(client, &training, &config.data_files, &name, &config.policy).await?;

    let promotion = if validation.decision.should_promote() {
        Some(
            executor
                .execute_decision(&validation.decision, &training, &name)
                .await?,
        )
    } else {
        None
    };

    Ok(RunSummary {
        training,
        validation,
        promotion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LabeledDataset, X_TEST_KEY, X_TRAIN_KEY, Y_TEST_KEY, Y_TRAIN_KEY};
    use crate::model::NearestCentroidTrainer;
    use crate::policy::Outcome;
    use mlcd_artifact::MemoryArtifactStore;
    use mlcd_registry::{InMemoryRegistry, RegistryError};
    use std::path::Path;
    use std::sync::Arc;

    const FEATURES: &str = "x\n0.0\n0.1\n0.2\n1.0\n1.1\n1.2\n";
    const LABELS: &str = "y\n0\n0\n0\n1\n1\n1\n";
    const FLIPPED: &str = "y\n1\n1\n1\n0\n0\n0\n";

    fn client() -> RegistryClient {
        RegistryClient::new(
            Arc::new(InMemoryRegistry::new()),
            Arc::new(MemoryArtifactStore::new()),
        )
    }

    fn name() -> ModelName {
        ModelName::new("my_model").unwrap()
    }

    async fn data(dir: &Path, train_labels: &str) -> DataFiles {
        for (file, contents) in [
            ("x_train.csv", FEATURES),
            ("y_train.csv", train_labels),
            ("x_test.csv", FEATURES),
            ("y_test.csv", LABELS),
        ] {
            tokio::fs::write(dir.join(file), contents).await.unwrap();
        }
        DataFiles::from_dir(dir)
    }

    #[tokio::test]
    async fn train_records_run_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let client = client();
        let files = data(dir.path(), LABELS).await;

        let output = train(&client, &NearestCentroidTrainer::new(), &files, "exp").await.unwrap();
        assert_eq!(output.artifact_path().to_string(), MODEL_ARTIFACT_PATH);

        let run = client.get_run(output.run_id).await.unwrap().unwrap();
        assert_eq!(run.experiment, "exp");
        assert_eq!(run.artifact_uri, output.artifact_uri);
        assert_eq!(run.params[MODEL_TYPE_PARAM], "nearest_centroid");
        assert_eq!(run.params["distance"], "euclidean");
        assert!(run.tags.contains_key(GIT_REVISION_TAG));
    }

    #[tokio::test]
    async fn train_missing_key_fails_before_reading() {
        let client = client();
        let files = DataFiles::new().with(X_TRAIN_KEY, "/nonexistent/x.csv");
        let err = train(&client, &NearestCentroidTrainer::new(), &files, "exp")
            .await
            .unwrap_err();
        assert!(err.is_missing_input());
    }

    #[tokio::test]
    async fn cold_start_promotes_good_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let client = client();
        let files = data(dir.path(), LABELS).await;
        let output = train(&client, &NearestCentroidTrainer::new(), &files, "exp").await.unwrap();

        let report = validate(&client, &output, &files, &name(), &PromotionPolicy::default())
            .await
            .unwrap();
        assert!(report.incumbent.is_none());
        assert_eq!(report.candidate.f1, 1.0);
        assert_eq!(report.decision.outcome, Outcome::PromoteNew);
    }

    #[tokio::test]
    async fn equal_candidate_keeps_incumbent() {
        let dir = tempfile::tempdir().unwrap();
        let executor = PromotionExecutor::new(client());
        let files = data(dir.path(), LABELS).await;
        let trainer = NearestCentroidTrainer::new();

        let first = train(executor.client(), &trainer, &files, "exp").await.unwrap();
        push(&executor, &first, &name()).await.unwrap();

        let second = train(executor.client(), &trainer, &files, "exp").await.unwrap();
        let policy = PromotionPolicy::default();
        let report = validate(executor.client(), &second, &files, &name(), &policy)
            .await
            .unwrap();
        assert_eq!(report.incumbent.as_ref().unwrap().performance.f1, 1.0);
        assert_eq!(report.decision.outcome, Outcome::KeepIncumbent);
    }

    #[tokio::test]
    async fn useless_candidate_without_incumbent_is_violation() {
        let dir = tempfile::tempdir().unwrap();
        let client = client();
        let files = data(dir.path(), FLIPPED).await;
        let output = train(&client, &NearestCentroidTrainer::new(), &files, "exp").await.unwrap();

        let err = validate(&client, &output, &files, &name(), &PromotionPolicy::default())
            .await
            .unwrap_err();
        assert!(err.policy_violation().is_some());
    }

    #[tokio::test]
    async fn unknown_run_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let client = client();
        let files = data(dir.path(), LABELS).await;
        let payload = TrainingOutput::new(mlcd_artifact::ArtifactUri::new(
            RunId::new(),
            model_artifact_path().unwrap(),
        ));

        let err = validate(&client, &payload, &files, &name(), &PromotionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownRun { .. }));
    }

    #[tokio::test]
    async fn unreadable_incumbent_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let client = client();
        let files = data(dir.path(), LABELS).await;

        // production version bound to an artifact that was never written
        client
            .promote(RunId::new(), &model_artifact_path().unwrap(), &name())
            .await
            .unwrap();
        let output = train(&client, &NearestCentroidTrainer::new(), &files, "exp").await.unwrap();

        let err = validate(&client, &output, &files, &name(), &PromotionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registry(RegistryError::ArtifactNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn run_replaces_worse_incumbent() {
        let dir = tempfile::tempdir().unwrap();
        let executor = PromotionExecutor::new(client());
        let name = name();

        // incumbent trained on flipped labels scores 0 on the test split
        let flipped = LabeledDataset::new(
            vec![vec![0.0], vec![1.0]],
            vec![1, 0],
        )
        .unwrap();
        let bad = NearestCentroidTrainer::new().fit(&flipped).unwrap();
        let bad_run = RunId::new();
        executor
            .client()
            .store_artifact(bad_run, &model_artifact_path().unwrap(), &bad)
            .await
            .unwrap();
        let old = executor
            .client()
            .promote(bad_run, &model_artifact_path().unwrap(), &name)
            .await
            .unwrap();

        let config = PipelineConfig::default()
            .with_model_name(name.as_str())
            .with_data_files(data(dir.path(), LABELS).await);
        let summary = run(&executor, &NearestCentroidTrainer::new(), &config).await.unwrap();

        assert_eq!(summary.validation.decision.outcome, Outcome::PromoteNew);
        let receipt = summary.promotion.unwrap();
        assert_eq!(receipt.archived, vec![old]);
        assert_eq!(
            executor.client().get_production_version(&name).await.unwrap(),
            Some(receipt.promoted)
        );
    }

    #[tokio::test]
    async fn run_keeps_equal_incumbent_without_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let executor = PromotionExecutor::new(client());
        let config = PipelineConfig::default().with_data_files(data(dir.path(), LABELS).await);
        let trainer = NearestCentroidTrainer::new();

        let first = run(&executor, &trainer, &config).await.unwrap();
        let second = run(&executor, &trainer, &config).await.unwrap();

        assert!(first.promotion.is_some());
        assert!(second.promotion.is_none());
        let live = executor
            .client()
            .production_versions(&config.model().unwrap())
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn validate_requires_test_keys() {
        let client = client();
        let payload = TrainingOutput::new(mlcd_artifact::ArtifactUri::new(
            RunId::new(),
            model_artifact_path().unwrap(),
        ));
        let files = DataFiles::new()
            .with(X_TEST_KEY, "x.csv")
            .with(Y_TRAIN_KEY, "y.csv");
        let err = validate(&client, &payload, &files, &name(), &PromotionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Dataset(crate::dataset::DatasetError::MissingInput { ref key })
                if key == Y_TEST_KEY
        ));
    }
}
