//! Pipeline configuration
//!
//! Loaded from a TOML file, then overridden by environment variables, then by
//! command-line flags. Every field has a default so an empty file is valid.
//!
//! ```toml
//! model_name = "my_model"
//! experiment = "my_model_training"
//! registry_root = "/var/lib/mlcd"
//!
//! [policy]
//! margin = 0.01
//! floor = 0.4
//!
//! [data_files]
//! transformed_x_train_file = "data/x_train.csv"
//! transformed_y_train_file = "data/y_train.csv"
//! transformed_x_test_file = "data/x_test.csv"
//! transformed_y_test_file = "data/y_test.csv"
//!
//! [deploy]
//! image = "deployed_model"
//! network = "mlcd_default"
//! ```

use crate::dataset::DataFiles;
use crate::deploy::{
    DeploySettings, ACCESS_KEY_ENV, S3_ENDPOINT_ENV, SECRET_KEY_ENV, TRACKING_URI_ENV,
};
use crate::policy::{PolicyConfigError, PromotionPolicy};
use mlcd_registry::ModelName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model name override
pub const MODEL_NAME_ENV: &str = "MLCD_MODEL_NAME";
/// Floor override
pub const FLOOR_ENV: &str = "MLCD_FLOOR";
/// Margin override
pub const MARGIN_ENV: &str = "MLCD_MARGIN";
/// Registry root override
pub const REGISTRY_ROOT_ENV: &str = "MLCD_REGISTRY_ROOT";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("model name must not be empty")]
    EmptyModelName,

    #[error("experiment name must not be empty")]
    EmptyExperiment,

    #[error(transparent)]
    Policy(#[from] PolicyConfigError),
}

/// Settings shared by all pipeline steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Registered model name
    pub model_name: String,
    /// Experiment runs are recorded under
    pub experiment: String,
    /// Directory holding the registry and artifact store
    pub registry_root: PathBuf,
    pub policy: PromotionPolicy,
    pub data_files: DataFiles,
    pub deploy: DeploySettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_name: "my_model".to_string(),
            experiment: "my_model_training".to_string(),
            registry_root: PathBuf::from("mlcd-data"),
            policy: PromotionPolicy::default(),
            data_files: DataFiles::new(),
            deploy: DeploySettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse TOML text
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed TOML or wrong field types
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError::Read` or `ConfigError::Parse`
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&text, path)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` for unparsable numbers
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` for unparsable numbers
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |var: &'static str| -> Result<Option<f64>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| ConfigError::InvalidEnv { var, value })
                })
                .transpose()
        };

        if let Some(floor) = number(FLOOR_ENV)? {
            self.policy.floor = floor;
        }
        if let Some(margin) = number(MARGIN_ENV)? {
            self.policy.margin = margin;
        }
        if let Some(name) = lookup(MODEL_NAME_ENV) {
            self.model_name = name;
        }
        if let Some(root) = lookup(REGISTRY_ROOT_ENV) {
            self.registry_root = PathBuf::from(root);
        }

        let deploy = &mut self.deploy;
        for (var, field) in [
            (TRACKING_URI_ENV, &mut deploy.tracking_uri),
            (S3_ENDPOINT_ENV, &mut deploy.s3_endpoint_url),
            (ACCESS_KEY_ENV, &mut deploy.access_key_id),
            (SECRET_KEY_ENV, &mut deploy.secret_access_key),
        ] {
            if let Some(value) = lookup(var) {
                *field = value;
            }
        }
        Ok(self)
    }

    /// Set model name
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Set policy
    #[must_use]
    pub fn with_policy(mut self, policy: PromotionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set registry root
    #[must_use]
    pub fn with_registry_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.registry_root = root.into();
        self
    }

    /// Set data files
    #[must_use]
    pub fn with_data_files(mut self, files: DataFiles) -> Self {
        self.data_files = files;
        self
    }

    /// Check every field
    ///
    /// # Errors
    /// Returns the first invalid field
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model()?;
        if self.experiment.trim().is_empty() {
            return Err(ConfigError::EmptyExperiment);
        }
        self.policy.validate()?;
        Ok(())
    }

    /// Validated model name
    ///
    /// # Errors
    /// Returns `ConfigError::EmptyModelName` for a blank name
    pub fn model(&self) -> Result<ModelName, ConfigError> {
        ModelName::new(&self.model_name).map_err(|_| ConfigError::EmptyModelName)
    }

    /// Registry state directory
    #[must_use]
    pub fn registry_dir(&self) -> PathBuf {
        self.registry_root.join("registry")
    }

    /// Artifact store directory
    #[must_use]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.registry_root.join("artifacts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{X_TRAIN_KEY, Y_TEST_KEY};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn origin() -> PathBuf {
        PathBuf::from("mlcd.toml")
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = PipelineConfig::from_toml("", &origin()).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let text = r#"
            model_name = "churn"

            [policy]
            floor = 0.6

            [data_files]
            transformed_x_train_file = "x.csv"

            [deploy]
            host_port = 8080
        "#;
        let config = PipelineConfig::from_toml(text, &origin()).unwrap();

        assert_eq!(config.model_name, "churn");
        assert_eq!(config.policy.floor, 0.6);
        assert_eq!(config.policy.margin, 0.01);
        assert_eq!(config.data_files.get(X_TRAIN_KEY).unwrap(), Path::new("x.csv"));
        assert!(config.data_files.get(Y_TEST_KEY).is_err());
        assert_eq!(config.deploy.host_port, 8080);
        assert_eq!(config.deploy.image, "deployed_model");
    }

    #[test]
    fn malformed_file_rejected() {
        let err = PipelineConfig::from_toml("policy = 3", &origin()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (MODEL_NAME_ENV, "from_env"),
            (FLOOR_ENV, "0.55"),
            (REGISTRY_ROOT_ENV, "/srv/mlcd"),
            (TRACKING_URI_ENV, "http://registry:5000"),
        ]);
        let config = PipelineConfig::default()
            .apply_env_with(|var| env.get(var).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.model_name, "from_env");
        assert_eq!(config.policy.floor, 0.55);
        assert_eq!(config.policy.margin, 0.01);
        assert_eq!(config.registry_dir(), PathBuf::from("/srv/mlcd/registry"));
        assert_eq!(config.deploy.tracking_uri, "http://registry:5000");
    }

    #[test]
    fn unparsable_environment_number_rejected() {
        let err = PipelineConfig::default()
            .apply_env_with(|var| (var == MARGIN_ENV).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: MARGIN_ENV, .. }));
    }

    #[test]
    fn validation() {
        assert!(matches!(
            PipelineConfig::default().with_model_name("  ").validate(),
            Err(ConfigError::EmptyModelName)
        ));
        let bad_policy = PromotionPolicy {
            margin: 0.01,
            floor: 2.0,
        };
        assert!(matches!(
            PipelineConfig::default().with_policy(bad_policy).validate(),
            Err(ConfigError::Policy(_))
        ));
    }
}
