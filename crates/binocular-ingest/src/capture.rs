//! Capture subprocess.
//!
//! Launches the external HTTP capture tool (`httpry` by default) with a
//! filter covering every published port and hands its stdout to the
//! ingestion worker.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use binocular_common::error::{BinocularError, Result};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};

/// Builds a capture filter matching any of `ports`.
///
/// ```
/// use binocular_ingest::capture::filter_expression;
/// assert_eq!(filter_expression([80, 8080]), "port 80 or port 8080");
/// ```
pub fn filter_expression(ports: impl IntoIterator<Item = u16>) -> String {
    ports
        .into_iter()
        .map(|p| format!("port {p}"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// A resolved capture invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl CaptureCommand {
    /// Creates an arbitrary invocation.
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds the `httpry` invocation: quiet, flushed output on `interface`,
    /// filtered to `ports`. With no ports the capture runs unfiltered.
    ///
    /// # Errors
    ///
    /// Returns an error if `binary` cannot be resolved through `PATH`.
    pub fn httpry(
        binary: &str,
        interface: &str,
        ports: impl IntoIterator<Item = u16>,
    ) -> Result<Self> {
        let program = which::which(binary).map_err(|_| BinocularError::NotFound {
            kind: "capture binary",
            id: format!("{binary}: install httpry or pass --capture-binary"),
        })?;
        Ok(Self::new(program, httpry_args(interface, ports)))
    }

    /// Starts the process with stdout piped and stderr inherited.
    ///
    /// The child is killed when the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn spawn(&self) -> Result<CaptureProcess> {
        tracing::info!(program = %self.program.display(), args = ?self.args, "starting capture");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BinocularError::Capture {
                message: format!("cannot start {}: {e}", self.program.display()),
            })?;
        let stdout = child.stdout.take().ok_or_else(|| BinocularError::Capture {
            message: "capture stdout was not piped".into(),
        })?;
        tracing::info!(pid = child.id(), "capture running");
        Ok(CaptureProcess {
            child,
            stdout: Some(BufReader::new(stdout)),
        })
    }
}

fn httpry_args(interface: &str, ports: impl IntoIterator<Item = u16>) -> Vec<String> {
    let mut args: Vec<String> = vec!["-q".into(), "-F".into(), "-i".into(), interface.into()];
    let filter = filter_expression(ports);
    if filter.is_empty() {
        tracing::warn!(interface, "no published ports, capturing unfiltered");
    } else {
        args.push(filter);
    }
    args
}

/// A running capture process.
#[derive(Debug)]
pub struct CaptureProcess {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
}

impl CaptureProcess {
    /// Takes the buffered stdout reader. Returns `None` if already taken.
    pub fn take_output(&mut self) -> Option<BufReader<ChildStdout>> {
        self.stdout.take()
    }

    /// Waits for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(|e| BinocularError::Capture {
            message: format!("waiting for capture failed: {e}"),
        })
    }

    /// Kills the process and reaps it.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(|e| BinocularError::Capture {
            message: format!("stopping capture failed: {e}"),
        })
    }
}
