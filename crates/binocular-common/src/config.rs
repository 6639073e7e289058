//! Global configuration model for Binocular.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BinocularError, Result};

/// How the registry treats two workloads claiming the same port or address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The workload seen later replaces the earlier one.
    #[default]
    LastWins,
    /// The workload seen first keeps the key.
    FirstWins,
    /// Building the registry fails.
    Reject,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastWins => write!(f, "last-wins"),
            Self::FirstWins => write!(f, "first-wins"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = BinocularError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last-wins" => Ok(Self::LastWins),
            "first-wins" => Ok(Self::FirstWins),
            "reject" => Ok(Self::Reject),
            other => Err(BinocularError::Config {
                message: format!(
                    "unknown duplicate policy '{other}' (expected last-wins, first-wins or reject)"
                ),
            }),
        }
    }
}

/// Retry and dead-letter settings for store writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendConfig {
    /// Total write attempts per event, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the retry delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// File receiving events that exhausted every attempt.
    pub dead_letter: Option<PathBuf>,
}

impl Default for AppendConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_APPEND_ATTEMPTS,
            initial_backoff_ms: constants::DEFAULT_APPEND_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_APPEND_MAX_BACKOFF_MS,
            dead_letter: None,
        }
    }
}

/// Root configuration for Binocular.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinocularConfig {
    /// Network interface handed to the capture tool.
    pub interface: String,
    /// Path of the event store file.
    pub db_path: PathBuf,
    /// Socket address the query server binds to.
    pub listen: String,
    /// Capture binary name or path.
    pub capture_binary: String,
    /// Registry collision handling.
    pub duplicate_policy: DuplicatePolicy,
    /// Store write policy.
    pub append: AppendConfig,
}

impl Default for BinocularConfig {
    fn default() -> Self {
        Self {
            interface: constants::DEFAULT_INTERFACE.into(),
            db_path: PathBuf::from(constants::DEFAULT_DB_FILE),
            listen: constants::DEFAULT_LISTEN_ADDR.into(),
            capture_binary: constants::DEFAULT_CAPTURE_BINARY.into(),
            duplicate_policy: DuplicatePolicy::default(),
            append: AppendConfig::default(),
        }
    }
}

impl BinocularConfig {
    /// Loads a configuration file. Missing keys take their default value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| BinocularError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a [`BinocularError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.interface.trim().is_empty() {
            return Err(config_err("interface must not be empty"));
        }
        if self.capture_binary.trim().is_empty() {
            return Err(config_err("capture_binary must not be empty"));
        }
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(config_err(format!(
                "listen address '{}' is not a socket address",
                self.listen
            )));
        }
        if self.append.max_attempts == 0 {
            return Err(config_err("append.max_attempts must be at least 1"));
        }
        if self.append.initial_backoff_ms > self.append.max_backoff_ms {
            return Err(config_err(
                "append.initial_backoff_ms must not exceed append.max_backoff_ms",
            ));
        }
        Ok(())
    }
}

fn config_err(message: impl Into<String>) -> BinocularError {
    BinocularError::Config {
        message: message.into(),
    }
}
