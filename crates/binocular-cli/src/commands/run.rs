//! `binocular run` — Capture, attribute, store, and serve.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use binocular_common::config::BinocularConfig;
use binocular_ingest::capture::{CaptureCommand, CaptureProcess};
use binocular_ingest::worker::{IngestOutcome, IngestWorker};
use binocular_server::QueryServer;
use binocular_store::EventStore;
use binocular_store::policy::AppendPolicy;
use clap::Args;

use super::DiscoveryArgs;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Network interface to capture on.
    #[arg(short, long, env = "BINOCULAR_IFACE")]
    pub interface: Option<String>,

    /// Address the query server listens on.
    #[arg(long, env = "BINOCULAR_LISTEN")]
    pub listen: Option<String>,

    /// Capture binary (httpry-compatible).
    #[arg(long, env = "BINOCULAR_CAPTURE_BINARY")]
    pub capture_binary: Option<String>,

    /// File receiving events the store could not accept.
    #[arg(long, env = "BINOCULAR_DEAD_LETTER")]
    pub dead_letter: Option<PathBuf>,

    /// Store write attempts per event.
    #[arg(long)]
    pub append_attempts: Option<u32>,

    /// Workload discovery options.
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

impl RunArgs {
    /// Applies flag overrides on top of `config` and validates the result.
    fn apply(&self, mut config: BinocularConfig) -> anyhow::Result<BinocularConfig> {
        if let Some(interface) = &self.interface {
            config.interface.clone_from(interface);
        }
        if let Some(listen) = &self.listen {
            config.listen.clone_from(listen);
        }
        if let Some(binary) = &self.capture_binary {
            config.capture_binary.clone_from(binary);
        }
        if let Some(path) = &self.dead_letter {
            config.append.dead_letter = Some(path.clone());
        }
        if let Some(attempts) = self.append_attempts {
            config.append.max_attempts = attempts;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Executes the `run` command.
///
/// Startup (discovery, registry, store, listener, capture launch) happens
/// in order and any failure aborts. Afterwards ingestion and the query
/// server run side by side until Ctrl+C. If the capture ends first the
/// server keeps answering queries.
///
/// # Errors
///
/// Returns an error if any startup step fails or the server stops with
/// an error.
pub fn execute(args: RunArgs, config: BinocularConfig) -> anyhow::Result<()> {
    let config = args.apply(config)?;
    let registry = args.discovery.build_registry(&config)?;
    let store = EventStore::open(&config.db_path)
        .with_context(|| format!("opening event store {}", config.db_path.display()))?;
    let policy = AppendPolicy::from_config(&config.append);

    super::runtime()?.block_on(async move {
        let server = QueryServer::bind(&config.listen, store.clone())
            .await
            .context("binding query server")?;
        let command =
            CaptureCommand::httpry(&config.capture_binary, &config.interface, registry.ports())?;
        let mut capture = command
            .spawn()
            .with_context(|| format!("starting capture on {}", config.interface))?;
        let output = capture
            .take_output()
            .context("capture output unavailable")?;

        let (_shutdown_tx, shutdown_rx) = super::shutdown_on_ctrl_c()?;
        let worker = IngestWorker::new(registry, Arc::new(store)).with_policy(policy);
        let ingest = tokio::spawn(worker.run(output, shutdown_rx.clone()));
        let serve = tokio::spawn(server.serve(shutdown_rx));

        let report = ingest.await.context("ingestion task panicked")?;
        match &report.outcome {
            IngestOutcome::Cancelled => stop_capture(&mut capture).await,
            IngestOutcome::Exhausted => {
                let status = capture.wait().await?;
                tracing::warn!(%status, "capture exited; still serving, press Ctrl+C to stop");
            }
            IngestOutcome::Failed(e) => {
                tracing::error!(error = %e, "capture stream failed; still serving, press Ctrl+C to stop");
                stop_capture(&mut capture).await;
            }
        }

        serve.await.context("query server task panicked")??;
        Ok(())
    })
}

async fn stop_capture(capture: &mut CaptureProcess) {
    if let Err(e) = capture.kill().await {
        tracing::warn!(error = %e, "capture did not stop cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            interface: None,
            listen: None,
            capture_binary: None,
            dead_letter: None,
            append_attempts: None,
            discovery: DiscoveryArgs {
                inventory: None,
                docker_binary: "docker".into(),
                duplicate_policy: None,
            },
        }
    }

    #[test]
    fn flags_override_config() {
        let run = RunArgs {
            interface: Some("br0".into()),
            listen: Some("127.0.0.1:9000".into()),
            dead_letter: Some(PathBuf::from("dead.jsonl")),
            append_attempts: Some(7),
            ..args()
        };
        let config = run.apply(BinocularConfig::default()).expect("valid");
        assert_eq!(config.interface, "br0");
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.append.max_attempts, 7);
        assert_eq!(config.append.dead_letter, Some(PathBuf::from("dead.jsonl")));
        assert_eq!(config.capture_binary, "httpry");
    }

    #[test]
    fn invalid_override_fails_validation() {
        let run = RunArgs {
            append_attempts: Some(0),
            ..args()
        };
        assert!(run.apply(BinocularConfig::default()).is_err());
    }
}
