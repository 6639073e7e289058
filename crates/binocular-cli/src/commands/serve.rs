//! `binocular serve` — Serve an existing event store.

use anyhow::Context;
use binocular_common::config::BinocularConfig;
use binocular_server::QueryServer;
use binocular_store::EventStore;
use clap::Args;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address the query server listens on.
    #[arg(long, env = "BINOCULAR_LISTEN")]
    pub listen: Option<String>,
}

/// Executes the `serve` command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the listener cannot
/// be bound.
pub fn execute(args: ServeArgs, mut config: BinocularConfig) -> anyhow::Result<()> {
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    config.validate()?;

    let store = EventStore::open(&config.db_path)
        .with_context(|| format!("opening event store {}", config.db_path.display()))?;

    super::runtime()?.block_on(async move {
        let server = QueryServer::bind(&config.listen, store)
            .await
            .context("binding query server")?;
        let (_shutdown_tx, shutdown_rx) = super::shutdown_on_ctrl_c()?;
        server.serve(shutdown_rx).await?;
        Ok(())
    })
}
