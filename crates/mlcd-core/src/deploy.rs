//! Serving container launcher
//!
//! After a promotion the serving container is replaced:
//! kill running containers of the image (failure tolerated), rebuild the
//! image, launch a new container pointed at the promoted model name.

use async_trait::async_trait;
use mlcd_registry::ModelName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Container environment variable carrying the model name
pub const MODEL_ENV: &str = "MLFLOW_MODEL";
/// Container environment variable carrying the registry location
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
/// Container environment variable carrying the artifact store endpoint
pub const S3_ENDPOINT_ENV: &str = "MLFLOW_S3_ENDPOINT_URL";
/// Artifact store access key
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
/// Artifact store secret key
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Deployment errors
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Launch without a model name
    #[error("model name must be set to launch the serving container")]
    MissingModelName,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl DeployError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// Serving container settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub image: String,
    pub build_context: PathBuf,
    pub host_port: u16,
    pub container_port: u16,
    pub network: String,
    pub tracking_uri: String,
    pub s3_endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            image: "deployed_model".to_string(),
            build_context: PathBuf::from("deploy/docker_build_context"),
            host_port: 5001,
            container_port: 5000,
            network: "mlcd_default".to_string(),
            tracking_uri: "http://mlflow-webserver:5000".to_string(),
            s3_endpoint_url: "http://s3-artifact-storage:9000".to_string(),
            access_key_id: "mlflow_access".to_string(),
            secret_access_key: "mlflow_secret".to_string(),
        }
    }
}

/// One serving container launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSpec {
    settings: DeploySettings,
    model: Option<ModelName>,
}

impl DeploymentSpec {
    /// Create spec without a model name
    #[must_use]
    pub fn new(settings: DeploySettings) -> Self {
        Self {
            settings,
            model: None,
        }
    }

    /// Model the container serves
    #[must_use]
    pub fn with_model(mut self, model: ModelName) -> Self {
        self.model = Some(model);
        self
    }

    /// Settings
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Arguments after `docker run`
    ///
    /// # Errors
    /// Returns `DeployError::MissingModelName` if no model name was set
    pub fn run_args(&self) -> Result<Vec<String>, DeployError> {
        let model = self.model.as_ref().ok_or(DeployError::MissingModelName)?;
        let s = &self.settings;
        let env = |key: &str, value: &str| ["-e".to_string(), format!("{key}={value}")];

        let mut args = vec![
            "-p".to_string(),
            format!("{}:{}", s.host_port, s.container_port),
        ];
        args.extend(env(MODEL_ENV, model.as_str()));
        args.extend(env(TRACKING_URI_ENV, &s.tracking_uri));
        args.extend(env(S3_ENDPOINT_ENV, &s.s3_endpoint_url));
        args.extend(env(ACCESS_KEY_ENV, &s.access_key_id));
        args.extend(env(SECRET_KEY_ENV, &s.secret_access_key));
        args.extend([
            "--network".to_string(),
            s.network.clone(),
            "-d".to_string(),
            s.image.clone(),
        ]);
        Ok(args)
    }
}

/// Redact the secret key in arguments before logging
fn redacted(args: &[String]) -> Vec<String> {
    let secret = format!("{SECRET_KEY_ENV}=");
    args.iter()
        .map(|arg| {
            if arg.starts_with(&secret) {
                format!("{secret}***")
            } else {
                arg.clone()
            }
        })
        .collect()
}

/// Container lifecycle operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Kill running containers started from `image`; returns how many
    async fn kill_running(&self, image: &str) -> Result<usize, DeployError>;

    /// Build `tag` from a build context directory
    async fn build_image(&self, context: &Path, tag: &str) -> Result<(), DeployError>;

    /// Start a detached container; returns its id
    async fn run(&self, args: &[String]) -> Result<String, DeployError>;
}

/// [`ContainerRuntime`] driving the `docker` command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    /// Use `docker` from `PATH`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another executable
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn output(&self, args: &[String]) -> Result<String, DeployError> {
        let command = format!("{} {}", self.program.display(), redacted(args).join(" "));
        tracing::info!(command = %command, "executing");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| DeployError::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(DeployError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn kill_running(&self, image: &str) -> Result<usize, DeployError> {
        let listed = self
            .output(&[
                "ps".to_string(),
                "--filter".to_string(),
                format!("ancestor={image}"),
                "-q".to_string(),
            ])
            .await?;
        let ids: Vec<String> = listed.split_whitespace().map(str::to_string).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut args = vec!["kill".to_string()];
        args.extend(ids.iter().cloned());
        self.output(&args).await?;
        Ok(ids.len())
    }

    async fn build_image(&self, context: &Path, tag: &str) -> Result<(), DeployError> {
        self.output(&[
            "build".to_string(),
            context.display().to_string(),
            "-t".to_string(),
            tag.to_string(),
        ])
        .await
        .map(|_| ())
    }

    async fn run(&self, args: &[String]) -> Result<String, DeployError> {
        let mut full = vec!["run".to_string()];
        full.extend(args.iter().cloned());
        self.output(&full).await
    }
}

/// Result of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentReceipt {
    /// Containers killed before the launch
    pub killed: usize,
    pub container_id: String,
}

/// Replace the serving container
///
/// # Errors
/// - `DeployError::MissingModelName` before touching any container
/// - build or launch failures; a failed kill is only logged
pub async fn deploy(
    runtime: &dyn ContainerRuntime,
    spec: &DeploymentSpec,
) -> Result<DeploymentReceipt, DeployError> {
    let args = spec.run_args()?;
    let settings = spec.settings();

    let killed = match runtime.kill_running(&settings.image).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(
                image = %settings.image,
                error = %e,
                "could not kill running containers"
            );
            0
        }
    };

    runtime
        .build_image(&settings.build_context, &settings.image)
        .await?;

    let container_id = runtime.run(&args).await?;
    tracing::info!(
        container = %container_id,
        args = ?redacted(&args),
        "serving container launched"
    );
    Ok(DeploymentReceipt {
        killed,
        container_id,
    })
}
