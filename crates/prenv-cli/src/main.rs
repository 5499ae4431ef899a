//! prenv - per-pull-request environments
//!
//! ## Commands
//!
//! - `apply`: create or update the environment of the current pull request
//! - `destroy`: tear it down
//! - `action`: apply or destroy as requested by an inbound dispatch event

mod logging;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prenv_core::{
    load_config, resolve_env_params, ActionsContext, AwsCliQueues, Chain, GitFileRegistry,
    Kubectl, RunInputs, RunSummary, Services, StoreFactory, StoreSettings, CONFIG_FILE_NAME,
};
use prenv_github::{Event, GitHubClient};
use prenv_state::{ConfigMapRegistry, EnvironmentRegistry, KubectlConfig, YamlFileRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};

use settings::{RegistryBackend, Settings};

#[derive(Parser)]
#[command(name = "prenv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ephemeral per-pull-request environments", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file, used when no raw config is supplied
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Create or update the pull request environment
    Apply,
    /// Destroy the pull request environment
    Destroy,
    /// Apply or destroy according to the triggering event's action
    Action,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    logging::init(cli.json, level);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping at the next step boundary");
            on_interrupt.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let settings = Settings::from_env();
    let github = Arc::new(
        GitHubClient::new(settings.github_config()).context("Failed to build GitHub client")?,
    );

    let event = match &settings.event_path {
        Some(path) => Some(
            Event::load(path)
                .await
                .with_context(|| format!("Failed to read event {}", path.display()))?,
        ),
        None => None,
    };

    let loaded = load_config(settings.raw_config.as_deref(), event.as_ref(), &cli.config)
        .await
        .context("Failed to load configuration")?;

    let actions = ActionsContext {
        event,
        sha: settings.sha.clone(),
        repository: settings.repository.clone(),
    };
    let env = resolve_env_params(&loaded.config, &actions, github.as_ref())
        .await
        .context("Failed to resolve environment parameters")?;
    info!(environment = %env.name, "resolved environment");

    let store_settings = settings.store_settings(".");
    let registry = build_registry(&settings, &store_settings, github.clone(), cancel.clone())?;

    let services = Services {
        registry,
        dispatcher: github.clone(),
        pull_requests: github,
        kubernetes: Arc::new(Kubectl::default()),
        queues: Arc::new(AwsCliQueues::new(settings.aws_region.clone(), None)),
    };
    let inputs = RunInputs {
        action: loaded.action,
        triggered_by: loaded.triggered_by,
    };

    let chain = Chain::new(loaded.config, env, inputs, services, store_settings, cancel)
        .context("Invalid configuration")?;

    let summary = match cli.command {
        Commands::Apply => chain.apply().await,
        Commands::Destroy => chain.destroy().await,
        Commands::Action => chain.action().await,
    }
    .with_context(|| format!("{:?} failed", cli.command))?;

    print_summary(&summary);
    Ok(())
}

fn build_registry(
    settings: &Settings,
    store_settings: &StoreSettings,
    github: Arc<GitHubClient>,
    cancel: CancellationToken,
) -> Result<Arc<dyn EnvironmentRegistry>> {
    let registry: Arc<dyn EnvironmentRegistry> = match &settings.registry {
        RegistryBackend::ConfigMap { name } => {
            Arc::new(ConfigMapRegistry::new(KubectlConfig::with_name(name.clone())))
        }
        RegistryBackend::Git { repo, file } => {
            let stores = StoreFactory::new(store_settings.clone(), github, cancel);
            Arc::new(
                GitFileRegistry::for_repository(&stores, repo, file.clone())
                    .context("Invalid state repository")?,
            )
        }
        RegistryBackend::File { path } => Arc::new(YamlFileRegistry::new(path.clone())),
    };
    Ok(registry)
}

fn print_summary(summary: &RunSummary) {
    println!("{} of {} finished", summary.operation, summary.environment);
    for (name, stage) in &summary.stages {
        println!("  {name}: {stage:?}");
    }
    for (name, outputs) in &summary.outputs {
        for (key, output) in outputs {
            println!("  {name}.{key} ({}) = {}", output.kind, output.value);
        }
    }
    for d in &summary.dispatches {
        println!(
            "  dispatched to {}/{} for {}",
            d.target.owner,
            d.target.repo,
            d.provisioner_names.join(", ")
        );
    }
}
