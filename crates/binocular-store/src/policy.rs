//! Write policy for events coming off the capture stream.
//!
//! A failed store write is retried with exponential backoff. When every
//! attempt fails the event goes to the dead-letter file, and only if that
//! also fails is it dropped. Each outcome is reported to the caller so it
//! can be counted.

use std::sync::Arc;
use std::time::Duration;

use binocular_common::config::AppendConfig;
use binocular_common::error::{BinocularError, Result};
use binocular_core::event::TrafficEvent;

use crate::dead_letter::DeadLetterFile;
use crate::key::EventKey;
use crate::store::EventSink;

/// How one event ended up after [`AppendPolicy::deliver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Stored under `key` after `attempts` tries.
    Stored {
        /// Key assigned by the store.
        key: EventKey,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed; the event was written to the dead-letter file.
    DeadLettered {
        /// Attempts used.
        attempts: u32,
    },
    /// Every attempt failed and the event could not be dead-lettered.
    Dropped {
        /// Attempts used.
        attempts: u32,
    },
}

impl Delivery {
    /// Number of store attempts made.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Stored { attempts, .. }
            | Self::DeadLettered { attempts }
            | Self::Dropped { attempts } => *attempts,
        }
    }
}

/// Bounded retry with exponential backoff and an optional dead-letter file.
#[derive(Debug, Clone)]
pub struct AppendPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    dead_letter: Option<DeadLetterFile>,
}

impl Default for AppendPolicy {
    fn default() -> Self {
        Self::from_config(&AppendConfig::default())
    }
}

impl AppendPolicy {
    /// Builds a policy from its configuration block.
    pub fn from_config(config: &AppendConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            dead_letter: config.dead_letter.clone().map(DeadLetterFile::new),
        }
    }

    /// Replaces the number of attempts (at least one).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Replaces the backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Sets the dead-letter destination.
    #[must_use]
    pub fn with_dead_letter(mut self, dead_letter: DeadLetterFile) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    /// Delay before retry number `retry` (zero-based), doubling each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Writes `event` to `sink` according to the policy.
    ///
    /// Store calls run on the blocking thread pool.
    pub async fn deliver(&self, sink: &Arc<dyn EventSink>, event: &TrafficEvent) -> Delivery {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match append_blocking(Arc::clone(sink), event.clone()).await {
                Ok(key) => {
                    if attempt > 1 {
                        tracing::info!(key = %key, attempt, "event stored after retry");
                    }
                    return Delivery::Stored {
                        key,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    tracing::warn!(attempt, max = self.max_attempts, error = %e, "event store write failed");
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff(attempt - 1)).await;
                    }
                }
            }
        }

        let attempts = self.max_attempts;
        let reason = last_error.map_or_else(String::new, |e| e.to_string());
        let Some(dead_letter) = &self.dead_letter else {
            tracing::error!(attempts, error = %reason, event = %event, "event dropped, no dead-letter file");
            return Delivery::Dropped { attempts };
        };

        match write_dead_letter_blocking(dead_letter.clone(), event.clone()).await {
            Ok(()) => {
                tracing::error!(
                    attempts,
                    error = %reason,
                    path = %dead_letter.path().display(),
                    "event dead-lettered"
                );
                Delivery::DeadLettered { attempts }
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, event = %event, "event dropped, dead-letter write failed");
                Delivery::Dropped { attempts }
            }
        }
    }
}

async fn append_blocking(sink: Arc<dyn EventSink>, event: TrafficEvent) -> Result<EventKey> {
    tokio::task::spawn_blocking(move || sink.append(&event))
        .await
        .map_err(|e| BinocularError::Store {
            message: format!("store task failed: {e}"),
        })?
}

async fn write_dead_letter_blocking(file: DeadLetterFile, event: TrafficEvent) -> Result<()> {
    tokio::task::spawn_blocking(move || file.write(&event))
        .await
        .map_err(|e| BinocularError::Store {
            message: format!("dead-letter task failed: {e}"),
        })?
}
