use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mlcd_artifact::FsArtifactStore;
use mlcd_core::{
    deploy, pipeline, DataFiles, DeploymentSpec, DockerCli, NearestCentroidTrainer,
    PipelineConfig, PromotionExecutor, TrainingOutput,
};
use mlcd_registry::{FileRegistry, RegistryClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn payload_arg() -> Arg {
    Arg::new("payload")
        .long("payload")
        .required(true)
        .help("Training payload as JSON, or @FILE to read it from a file")
}

fn data_dir_arg() -> Arg {
    Arg::new("data-dir")
        .long("data-dir")
        .value_parser(value_parser!(PathBuf))
        .help("Directory with x_train.csv, y_train.csv, x_test.csv, y_test.csv")
}

fn model_arg() -> Arg {
    Arg::new("model")
        .long("model")
        .help("Registered model name")
}

fn policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("floor")
                .long("floor")
                .value_parser(value_parser!(f64))
                .help("Minimum acceptable F1 score"),
        )
        .arg(
            Arg::new("margin")
                .long("margin")
                .value_parser(value_parser!(f64))
                .help("Relative F1 improvement required for promotion"),
        )
}

fn build_cli() -> Command {
    Command::new("mlcd")
        .version(mlcd_core::VERSION)
        .about("Train, validate and promote classification models")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("registry-root")
                .long("registry-root")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the registry and artifact store"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("train")
                .about("Fit a model and record the run; prints the training payload")
                .arg(data_dir_arg())
                .arg(
                    Arg::new("experiment")
                        .long("experiment")
                        .help("Experiment name"),
                ),
        )
        .subcommand(policy_args(
            Command::new("validate")
                .about("Compare the candidate with the production model")
                .arg(payload_arg())
                .arg(data_dir_arg())
                .arg(model_arg()),
        ))
        .subcommand(
            Command::new("promote")
                .about("Archive the production model and promote the candidate")
                .arg(payload_arg())
                .arg(model_arg()),
        )
        .subcommand(policy_args(
            Command::new("run")
                .about("Train, validate and promote in one invocation")
                .arg(data_dir_arg())
                .arg(model_arg()),
        ))
        .subcommand(
            Command::new("deploy")
                .about("Rebuild and relaunch the serving container")
                .arg(model_arg()),
        )
        .subcommand(
            Command::new("status")
                .about("List registered versions of a model")
                .arg(model_arg()),
        )
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Config file, then environment, then flags
async fn load_config(matches: &ArgMatches, sub: &ArgMatches) -> Result<PipelineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path).await?,
        None => PipelineConfig::default(),
    }
    .apply_env()?;

    if let Some(root) = matches.get_one::<PathBuf>("registry-root") {
        config = config.with_registry_root(root);
    }
    if let Ok(Some(model)) = sub.try_get_one::<String>("model") {
        config = config.with_model_name(model);
    }
    if let Ok(Some(dir)) = sub.try_get_one::<PathBuf>("data-dir") {
        config = config.with_data_files(DataFiles::from_dir(dir));
    }
    if let Ok(Some(experiment)) = sub.try_get_one::<String>("experiment") {
        config.experiment.clone_from(experiment);
    }
    if let Ok(Some(floor)) = sub.try_get_one::<f64>("floor") {
        config.policy.floor = *floor;
    }
    if let Ok(Some(margin)) = sub.try_get_one::<f64>("margin") {
        config.policy.margin = *margin;
    }

    config.validate()?;
    Ok(config)
}

async fn read_payload(arg: &str) -> Result<TrainingOutput> {
    let json = match arg.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(Path::new(path))
            .await
            .with_context(|| format!("reading payload file {path}"))?,
        None => arg.to_string(),
    };
    Ok(TrainingOutput::from_json(&json)?)
}

fn payload_value(sub: &ArgMatches) -> Result<&str> {
    sub.get_one::<String>("payload")
        .map(String::as_str)
        .context("missing --payload")
}

fn registry_client(config: &PipelineConfig) -> RegistryClient {
    RegistryClient::new(
        Arc::new(FileRegistry::new(config.registry_dir())),
        Arc::new(FsArtifactStore::new(config.artifacts_dir())),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_tracing(matches.get_flag("verbose"), matches.get_flag("json-logs"));

    let Some((name, sub)) = matches.subcommand() else {
        anyhow::bail!("no subcommand given");
    };
    let config = load_config(&matches, sub).await?;
    let model = config.model()?;
    let client = registry_client(&config);
    tracing::debug!(
        registry = %config.registry_root.display(),
        model = %model,
        command = name,
        "starting"
    );

    match name {
        "train" => {
            let output = pipeline::train(
                &client,
                &NearestCentroidTrainer::new(),
                &config.data_files,
                &config.experiment,
            )
            .await?;
            print_json(&output)?;
        }
        "validate" => {
            let payload = read_payload(payload_value(sub)?).await?;
            let report = pipeline::validate(
                &client,
                &payload,
                &config.data_files,
                &model,
                &config.policy,
            )
            .await?;
            tracing::info!(
                outcome = %report.decision.outcome,
                f1_new = report.decision.f1_new,
                f1_incumbent = report.decision.f1_incumbent,
                "validation finished"
            );
            print_json(&report)?;
        }
        "promote" => {
            let payload = read_payload(payload_value(sub)?).await?;
            let receipt = pipeline::push(&PromotionExecutor::new(client), &payload, &model).await?;
            print_json(&receipt)?;
        }
        "run" => {
            let executor = PromotionExecutor::new(client);
            let summary = pipeline::run(&executor, &NearestCentroidTrainer::new(), &config).await?;
            print_json(&summary)?;
        }
        "deploy" => {
            let spec = DeploymentSpec::new(config.deploy.clone()).with_model(model);
            let receipt = deploy(&DockerCli::new(), &spec).await?;
            print_json(&receipt)?;
        }
        "status" => {
            let versions = client.versions(&model).await?;
            if versions.is_empty() {
                tracing::info!(model = %model, "no registered versions");
            }
            print_json(&versions)?;
        }
        other => anyhow::bail!("unknown command {other}"),
    }

    Ok(())
}
