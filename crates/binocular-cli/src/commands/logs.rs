//! `binocular logs` — Print stored events.

use anyhow::Context;
use binocular_common::config::BinocularConfig;
use binocular_store::EventStore;
use clap::Args;

use crate::output::{event_header, format_event_row};

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Print the same JSON array `/logs` returns.
    #[arg(long)]
    pub json: bool,

    /// Include each event's store key.
    #[arg(long, conflicts_with = "json")]
    pub keys: bool,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub fn execute(args: &LogsArgs, config: &BinocularConfig) -> anyhow::Result<()> {
    let store = EventStore::open(&config.db_path)
        .with_context(|| format!("opening event store {}", config.db_path.display()))?;
    let entries = store.entries()?;

    if args.json {
        let events: Vec<_> = entries.into_iter().map(|(_, event)| event).collect();
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No events stored in {}", config.db_path.display());
        return Ok(());
    }

    if args.keys {
        println!("{:<26} {}", "KEY", event_header());
    } else {
        println!("{}", event_header());
    }
    for (key, event) in &entries {
        if args.keys {
            println!("{key} {}", format_event_row(event));
        } else {
            println!("{}", format_event_row(event));
        }
    }

    Ok(())
}
