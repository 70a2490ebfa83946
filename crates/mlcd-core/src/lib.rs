//! MLCD Core - model promotion workflow
//!
//! Decides whether a freshly trained model replaces the one in production and
//! carries out the replacement:
//! - Evaluates candidate and incumbent on the same test split
//! - Applies a margin/floor promotion policy to the two F1 scores
//! - Archives the old production version(s) and promotes the candidate
//! - Launches the serving container for the promoted model
//!
//! # Example
//!
//! ```rust,ignore
//! use mlcd_core::prelude::*;
//!
//! # async fn example(client: RegistryClient) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default().apply_env()?;
//! let executor = PromotionExecutor::new(client);
//!
//! let summary = pipeline::run(&executor, &NearestCentroidTrainer::new(), &config).await?;
//! println!("outcome: {}", summary.validation.decision.outcome);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod dataset;
pub mod deploy;
pub mod error;
pub mod executor;
pub mod lock;
pub mod metrics;
pub mod model;
pub mod payload;
pub mod pipeline;
pub mod policy;

pub use config::{ConfigError, PipelineConfig};
pub use dataset::{DataFiles, DatasetError, LabeledDataset};
pub use deploy::{
    deploy, ContainerRuntime, DeployError, DeploySettings, DeploymentReceipt, DeploymentSpec,
    DockerCli,
};
pub use error::PipelineError;
pub use executor::{PromotionExecutor, PromotionReceipt, PRODUCTION_ARTIFACT_PATH};
pub use lock::{PromotionGuard, PromotionLocks};
pub use metrics::{ConfusionMatrix, Label, MetricsError, PerformanceReport};
pub use model::{
    Distance, ModelError, NearestCentroid, NearestCentroidTrainer, Predictor, Trainer,
    TrainedModel,
};
pub use payload::TrainingOutput;
pub use pipeline::{IncumbentReport, RunSummary, ValidationReport, MODEL_ARTIFACT_PATH};
pub use policy::{
    DecisionError, Outcome, PolicyConfigError, PolicyViolation, PromotionDecision,
    PromotionPolicy, DEFAULT_FLOOR, DEFAULT_MARGIN,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the pipeline
    pub use crate::pipeline;
    pub use crate::{
        DataFiles, NearestCentroidTrainer, Outcome, PipelineConfig, PipelineError,
        PromotionExecutor, PromotionPolicy, TrainingOutput,
    };
    pub use mlcd_registry::{ModelName, RegistryClient};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
