//! CLI command definitions and dispatch.

pub mod ingest;
pub mod logs;
pub mod replay;
pub mod run;
pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use binocular_common::config::{BinocularConfig, DuplicatePolicy};
use binocular_core::registry::Registry;
use binocular_ingest::discovery::{DockerCli, InventoryFile, WorkloadSource};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;

/// Binocular — see which container talks to which.
#[derive(Parser, Debug)]
#[command(name = "binocular", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file; flags override its values.
    #[arg(long, global = true, env = "BINOCULAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the event store file.
    #[arg(long, global = true, env = "BINOCULAR_DB")]
    pub db: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover containers, capture traffic, store it, and serve the log.
    Run(run::RunArgs),
    /// Serve an existing event store without capturing.
    Serve(serve::ServeArgs),
    /// Ingest capture lines from a file or stdin, then exit.
    Ingest(ingest::IngestArgs),
    /// Print stored events.
    Logs(logs::LogsArgs),
    /// Store events from a dead-letter file.
    Replay(replay::ReplayArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Serve(args) => serve::execute(args, config),
        Command::Ingest(args) => ingest::execute(args, config),
        Command::Logs(args) => logs::execute(&args, &config),
        Command::Replay(args) => replay::execute(&args, &config),
    }
}

/// Loads the configuration file (if any) and applies global overrides.
fn load_config(cli: &Cli) -> anyhow::Result<BinocularConfig> {
    let mut config = match &cli.config {
        Some(path) => BinocularConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => BinocularConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.db_path.clone_from(db);
    }
    Ok(config)
}

/// Where the workload snapshot comes from.
#[derive(Args, Debug, Clone)]
pub struct DiscoveryArgs {
    /// JSON inventory of workloads instead of asking Docker.
    #[arg(long, env = "BINOCULAR_INVENTORY")]
    pub inventory: Option<PathBuf>,

    /// Docker CLI binary used for discovery.
    #[arg(long, default_value = "docker")]
    pub docker_binary: String,

    /// How to treat two workloads sharing a port or address.
    #[arg(long, env = "BINOCULAR_DUPLICATE_POLICY")]
    pub duplicate_policy: Option<DuplicatePolicy>,
}

impl DiscoveryArgs {
    fn source(&self) -> Box<dyn WorkloadSource> {
        match &self.inventory {
            Some(path) => Box::new(InventoryFile::new(path)),
            None => Box::new(DockerCli::new(&self.docker_binary)),
        }
    }

    /// Queries the workload source once and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails or the duplicate policy rejects
    /// the snapshot.
    pub fn build_registry(&self, config: &BinocularConfig) -> anyhow::Result<Arc<Registry>> {
        let source = self.source();
        let workloads = source
            .list_workloads()
            .with_context(|| format!("discovering workloads via {}", source.name()))?;
        let policy = self.duplicate_policy.unwrap_or(config.duplicate_policy);
        let registry = Registry::build(workloads, policy).context("building workload registry")?;
        if registry.is_empty() {
            tracing::warn!(source = source.name(), "no workloads discovered, events will be unattributed");
        }
        Ok(Arc::new(registry))
    }
}

/// Builds the multi-threaded runtime used by long-running commands.
fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")
}

/// Returns a shutdown channel flipped to `true` by Ctrl+C.
fn shutdown_on_ctrl_c() -> anyhow::Result<(Arc<watch::Sender<bool>>, watch::Receiver<bool>)> {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    let handler_tx = Arc::clone(&tx);
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        let _ = handler_tx.send(true);
    })
    .context("failed to set Ctrl+C handler")?;
    Ok((tx, rx))
}
