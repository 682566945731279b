//! Kestrel worker - consumes training jobs from the broker, trains a model
//! per job and publishes the outcome.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kestrel_orchestrator::{
    AmqpBroker, Broker, HttpStorageClient, JobOrchestrator, Worker, WorkerConfig,
};
use kestrel_training::{CommandTrainer, WorkspaceLayout};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Kestrel training worker
#[derive(Parser, Debug)]
#[command(
    name = "kestrel-worker",
    author,
    version,
    about = "Kestrel - object detection training worker"
)]
struct Args {
    /// Configuration file (defaults to ./kestrel.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level for Kestrel crates (trace, debug, info, warn, error); RUST_LOG
    /// takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Process a single job, then exit
    #[arg(long)]
    once: bool,

    /// Resolve and validate the configuration, print it, then exit
    #[arg(long)]
    check_config: bool,
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("warn,kestrel={level}")))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for ctrl-c; stop the worker by other means");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format)?;

    let config = WorkerConfig::load(args.config.as_deref()).context("invalid configuration")?;
    if args.check_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let layout = WorkspaceLayout::new(&config.workspace.root);
    layout.prepare_roots().context("cannot prepare workspace")?;

    let storage = Arc::new(HttpStorageClient::new(&config.storage)?);
    let trainer = Arc::new(
        CommandTrainer::new(&config.engine.program, &config.engine.base_model)
            .with_leading_args(config.engine.leading_args.clone()),
    );
    let broker = Arc::new(AmqpBroker::connect(&config.broker).await?);

    let job_broker: Arc<dyn Broker> = broker.clone();
    let orchestrator = JobOrchestrator::new(&config, job_broker, storage, trainer);
    let worker = Worker::new(orchestrator, config.broker.poll_interval());

    info!(
        workspace = %config.workspace.root.display(),
        storage = %config.storage.base_url,
        engine = %config.engine.program.display(),
        "Kestrel worker ready"
    );
    let result = worker.run(shutdown_signal(), args.once.then_some(1)).await;
    broker.close().await;

    let handled = result?;
    info!(handled, "Kestrel worker exiting");
    Ok(())
}
