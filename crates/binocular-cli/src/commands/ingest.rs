//! `binocular ingest` — Attribute and store capture lines read from a file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use binocular_common::config::BinocularConfig;
use binocular_ingest::worker::{IngestOutcome, IngestReport, IngestWorker};
use binocular_store::EventStore;
use binocular_store::policy::AppendPolicy;
use clap::Args;
use tokio::io::{AsyncBufRead, BufReader};

use super::DiscoveryArgs;

/// Arguments for the `ingest` command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Capture output to read; `-` or omitted reads stdin.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// File receiving events the store could not accept.
    #[arg(long, env = "BINOCULAR_DEAD_LETTER")]
    pub dead_letter: Option<PathBuf>,

    /// Workload discovery options.
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

impl IngestArgs {
    fn reads_stdin(&self) -> bool {
        self.input.as_ref().is_none_or(|p| p.as_os_str() == "-")
    }
}

/// Executes the `ingest` command.
///
/// Reads until end of input, then prints what was stored. Ctrl+C stops
/// early between lines.
///
/// # Errors
///
/// Returns an error if discovery, the store, or the input file fails.
pub fn execute(args: IngestArgs, mut config: BinocularConfig) -> anyhow::Result<()> {
    if let Some(path) = &args.dead_letter {
        config.append.dead_letter = Some(path.clone());
    }
    config.validate()?;

    let registry = args.discovery.build_registry(&config)?;
    let store = EventStore::open(&config.db_path)
        .with_context(|| format!("opening event store {}", config.db_path.display()))?;
    let worker = IngestWorker::new(registry, Arc::new(store))
        .with_policy(AppendPolicy::from_config(&config.append));

    let report = super::runtime()?.block_on(async move {
        let (_shutdown_tx, shutdown_rx) = super::shutdown_on_ctrl_c()?;
        let reader = open_input(&args).await?;
        Ok::<IngestReport, anyhow::Error>(worker.run(reader, shutdown_rx).await)
    })?;

    let stats = report.stats;
    println!(
        "{} lines, {} stored, {} malformed, {} responses skipped, {} dead-lettered, {} dropped",
        stats.lines, stats.stored, stats.malformed, stats.responses, stats.dead_lettered, stats.dropped
    );

    match report.outcome {
        IngestOutcome::Failed(e) => Err(e).context("reading capture input"),
        IngestOutcome::Exhausted | IngestOutcome::Cancelled => Ok(()),
    }
}

async fn open_input(args: &IngestArgs) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match &args.input {
        Some(path) if !args.reads_stdin() => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening capture input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}
