//! Keel Runner binary
//!
//! Loads a compiled pipeline spec, runs its steps in order against the local
//! container runtime and always tears the environment down afterwards.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keel_core::Spec;
use keel_runner::{Config, ContainerEngine, Engine};
use keel_runtime::PodmanClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keel-runner")]
#[command(about = "Run pipeline steps as containers", long_about = None)]
struct Cli {
    /// Container runtime binary (podman or docker)
    #[arg(long, env = "KEEL_RUNTIME")]
    runtime: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every step of a compiled pipeline spec
    Run {
        /// Path to the JSON pipeline spec
        #[arg(long, env = "KEEL_SPEC")]
        spec: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries step output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(runtime) = cli.runtime {
        config.runtime_binary = runtime;
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Run { spec } => run_pipeline(&spec, config).await,
    }
}

/// Runs the pipeline, returning an error when any step fails
async fn run_pipeline(path: &Path, config: Config) -> Result<()> {
    let spec = load_spec(path)?;

    let client = PodmanClient::new(config.runtime_binary.clone());
    let version = client
        .check_available()
        .await
        .with_context(|| format!("Container runtime '{}' is not usable", client.program()))?;
    info!("Using {}", version);

    let engine = ContainerEngine::new(Arc::new(client), config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the current step");
            trigger.cancel();
        }
    });

    let outcome = run_steps(&engine, &spec, &cancel).await;

    let report = engine.destroy(&spec).await;
    for failure in &report.failures {
        warn!("Cleanup: {}", failure);
    }

    outcome
}

async fn run_steps(engine: &dyn Engine, spec: &Spec, cancel: &CancellationToken) -> Result<()> {
    engine
        .setup(spec)
        .await
        .context("Failed to set up pipeline environment")?;

    let mut stdout = tokio::io::stdout();
    for step in &spec.steps {
        info!("Running step {}", step.name);
        let state = engine
            .run(spec, step, &mut stdout, cancel)
            .await
            .with_context(|| format!("Step '{}' failed", step.name))?;

        if !state.is_success() {
            error!(
                "Step {} exited with code {} (oom killed: {})",
                step.name, state.exit_code, state.oom_killed
            );
            anyhow::bail!("Step '{}' exited with code {}", step.name, state.exit_code);
        }
    }

    info!("Pipeline finished: {} step(s) succeeded", spec.steps.len());
    Ok(())
}

fn load_spec(path: &Path) -> Result<Spec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec {}", path.display()))?;
    let spec: Spec = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse spec {}", path.display()))?;
    Ok(spec)
}
