//! `binocular replay` — Store events from a dead-letter file.

use std::path::PathBuf;

use anyhow::Context;
use binocular_common::config::BinocularConfig;
use binocular_store::EventStore;
use binocular_store::dead_letter::DeadLetterFile;
use clap::Args;

/// Arguments for the `replay` command.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Dead-letter file; defaults to the configured one.
    pub file: Option<PathBuf>,

    /// Leave the file untouched after a successful replay.
    #[arg(long)]
    pub keep: bool,
}

/// Executes the `replay` command.
///
/// Events are appended in file order and receive new keys. The file is
/// emptied only if every event was stored.
///
/// # Errors
///
/// Returns an error if no file is configured, the file cannot be parsed,
/// or the store rejects an event.
pub fn execute(args: &ReplayArgs, config: &BinocularConfig) -> anyhow::Result<()> {
    let path = args
        .file
        .clone()
        .or_else(|| config.append.dead_letter.clone())
        .context("no dead-letter file given or configured")?;
    let file = DeadLetterFile::new(path);
    let events = file
        .read_all()
        .with_context(|| format!("reading {}", file.path().display()))?;

    if events.is_empty() {
        println!("Nothing to replay in {}", file.path().display());
        return Ok(());
    }

    let store = EventStore::open(&config.db_path)
        .with_context(|| format!("opening event store {}", config.db_path.display()))?;
    for (index, event) in events.iter().enumerate() {
        let key = store
            .append(event)
            .with_context(|| format!("storing event {} of {}", index + 1, events.len()))?;
        tracing::debug!(key = %key, "{event}");
    }

    if !args.keep {
        file.clear()?;
    }
    println!("Replayed {} events from {}", events.len(), file.path().display());
    Ok(())
}
