//! Ingestion worker.
//!
//! Reads capture lines until the stream ends or shutdown is requested.
//! For each line: parse, drop responses, attribute, and write through the
//! append policy. No line ever stops the loop; bad lines are counted.
//!
//! ```text
//! NotStarted --run()--> Running --EOF / shutdown / read error--> Stopped
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use binocular_core::attribution::attribute;
use binocular_core::capture::parse_line;
use binocular_core::registry::Registry;
use binocular_store::EventSink;
use binocular_store::policy::{AppendPolicy, Delivery};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;

/// Lifecycle of an ingestion worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Constructed, not yet reading.
    NotStarted,
    /// Consuming the capture stream.
    Running,
    /// Terminal; see the [`IngestReport`] for why.
    Stopped,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why the worker stopped.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The capture stream reached end of file.
    Exhausted,
    /// Shutdown was requested.
    Cancelled,
    /// Reading the capture stream failed.
    Failed(std::io::Error),
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "capture stream closed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(e) => write!(f, "capture read failed: {e}"),
        }
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines read, blank lines included. Invalid UTF-8 is decoded lossily
    /// and still counts as a line.
    pub lines: u64,
    /// Lines with too few fields.
    pub malformed: u64,
    /// Response-direction records discarded.
    pub responses: u64,
    /// Events persisted.
    pub stored: u64,
    /// Persisted events that needed more than one attempt.
    pub retried: u64,
    /// Events written to the dead-letter file.
    pub dead_lettered: u64,
    /// Events lost.
    pub dropped: u64,
}

/// Terminal state of a run.
#[derive(Debug)]
pub struct IngestReport {
    /// Why the worker stopped.
    pub outcome: IngestOutcome,
    /// What it did before stopping.
    pub stats: IngestStats,
}

/// Consumes capture lines into an event sink.
pub struct IngestWorker {
    registry: Arc<Registry>,
    sink: Arc<dyn EventSink>,
    policy: AppendPolicy,
    stats: IngestStats,
    state: watch::Sender<IngestState>,
}

impl fmt::Debug for IngestWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestWorker")
            .field("state", &*self.state.borrow())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl IngestWorker {
    /// Creates a worker writing to `sink` with the default append policy.
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn EventSink>) -> Self {
        let (state, _) = watch::channel(IngestState::NotStarted);
        Self {
            registry,
            sink,
            policy: AppendPolicy::default(),
            stats: IngestStats::default(),
            state,
        }
    }

    /// Replaces the append policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AppendPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<IngestState> {
        self.state.subscribe()
    }

    /// Runs until `reader` is exhausted, reading fails, or `shutdown`
    /// becomes `true`. Shutdown is checked between lines, never in the
    /// middle of storing one.
    ///
    /// If every shutdown sender is dropped the worker keeps reading until
    /// the stream ends.
    pub async fn run<R>(mut self, reader: R, mut shutdown: watch::Receiver<bool>) -> IngestReport
    where
        R: AsyncBufRead + Unpin,
    {
        self.transition(IngestState::Running);
        let mut lines = reader.split(b'\n');
        let mut cancellable = true;

        let outcome = loop {
            if cancellable && *shutdown.borrow_and_update() {
                break IngestOutcome::Cancelled;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed(), if cancellable => {
                    if changed.is_err() {
                        tracing::debug!("shutdown channel closed, reading until end of stream");
                        cancellable = false;
                    }
                }
                line = lines.next_segment() => match line {
                    Ok(Some(raw)) => self.handle_line(&decode_line(&raw)).await,
                    Ok(None) => break IngestOutcome::Exhausted,
                    Err(e) => break IngestOutcome::Failed(e),
                },
            }
        };

        self.transition(IngestState::Stopped);
        tracing::info!(
            outcome = %outcome,
            lines = self.stats.lines,
            stored = self.stats.stored,
            malformed = self.stats.malformed,
            responses = self.stats.responses,
            dead_lettered = self.stats.dead_lettered,
            dropped = self.stats.dropped,
            "ingestion stopped"
        );
        IngestReport {
            outcome,
            stats: self.stats,
        }
    }

    async fn handle_line(&mut self, line: &str) {
        self.stats.lines += 1;
        if line.trim().is_empty() {
            return;
        }

        let record = match parse_line(line) {
            Ok(record) => record,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, "skipping capture line");
                return;
            }
        };

        if !record.direction().is_forward() {
            self.stats.responses += 1;
            return;
        }

        let event = attribute(record, &self.registry);
        match self.policy.deliver(&self.sink, &event).await {
            Delivery::Stored { key, attempts } => {
                self.stats.stored += 1;
                if attempts > 1 {
                    self.stats.retried += 1;
                }
                tracing::info!(key = %key, "{event}");
            }
            Delivery::DeadLettered { .. } => self.stats.dead_lettered += 1,
            Delivery::Dropped { .. } => self.stats.dropped += 1,
        }
    }

    fn transition(&self, next: IngestState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = %previous, to = %next, "ingestion state");
    }
}

/// Decodes one raw capture line. The capture tool echoes header bytes as
/// they arrived, so invalid UTF-8 is replaced rather than rejected.
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if let Cow::Owned(_) = line {
        tracing::debug!(line = %line, "capture line contained invalid UTF-8");
    }
    line
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use binocular_common::config::DuplicatePolicy;
    use binocular_common::error::{BinocularError, Result};
    use binocular_common::types::WorkloadRef;
    use binocular_core::event::TrafficEvent;
    use binocular_store::EventKey;
    use binocular_store::key::KeyGenerator;
    use tokio::io::AsyncWriteExt;

    use super::*;

    const REQUEST: &str = "2024-01-01 10:00:00 10.0.0.5 10.0.0.6 => GET svc:8080 /api/foo - 200 OK";
    const RESPONSE: &str = "2024-01-01 10:00:00 10.0.0.6 10.0.0.5 <= GET svc:8080 /api/foo - 200 OK";

    #[derive(Default)]
    struct MemorySink {
        events: Mutex<Vec<TrafficEvent>>,
        keys: KeyGenerator,
    }

    impl EventSink for MemorySink {
        fn append(&self, event: &TrafficEvent) -> Result<EventKey> {
            self.events.lock().unwrap().push(event.clone());
            self.keys.next_key()
        }
    }

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn append(&self, _event: &TrafficEvent) -> Result<EventKey> {
            Err(BinocularError::Store {
                message: "read-only".into(),
            })
        }
    }

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::build(
                [
                    WorkloadRef::new("A", [8080], ""),
                    WorkloadRef::new("B", [], "10.0.0.5"),
                ],
                DuplicatePolicy::LastWins,
            )
            .unwrap(),
        )
    }

    async fn ingest(input: &str) -> (IngestReport, Vec<TrafficEvent>) {
        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = watch::channel(false);
        let report = IngestWorker::new(registry(), sink.clone())
            .run(input.as_bytes(), rx)
            .await;
        let events = sink.events.lock().unwrap().clone();
        (report, events)
    }

    #[tokio::test]
    async fn request_becomes_attributed_event() {
        let (report, events) = ingest(&format!("{REQUEST}\n")).await;
        assert!(matches!(report.outcome, IngestOutcome::Exhausted));
        assert_eq!(report.stats.stored, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].from, "B");
        assert_eq!(events[0].to, "A");
    }

    #[tokio::test]
    async fn responses_are_never_stored() {
        let (report, events) = ingest(&format!("{RESPONSE}\n{RESPONSE}\n")).await;
        assert!(events.is_empty());
        assert_eq!(report.stats.responses, 2);
        assert_eq!(report.stats.stored, 0);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_and_counted() {
        let input = format!("garbage\n\n{REQUEST}\nshort line here\n{REQUEST}\n");
        let (report, events) = ingest(&input).await;
        assert_eq!(events.len(), 2);
        assert_eq!(report.stats.lines, 5);
        assert_eq!(report.stats.malformed, 2);
    }

    #[tokio::test]
    async fn bad_timestamp_still_stores_one_event() {
        let broken = REQUEST.replace("10:00:00", "25:99:99");
        let (report, events) = ingest(&format!("{broken}\n{REQUEST}\n")).await;
        assert_eq!(report.stats.stored, 2);
        assert_eq!(events[0].time.timestamp(), 0);
        assert_ne!(events[1].time.timestamp(), 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_an_open_stream() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let (tx, rx) = watch::channel(false);
        let sink = Arc::new(MemorySink::default());
        let worker = IngestWorker::new(registry(), sink.clone());
        let mut state = worker.subscribe();
        let handle = tokio::spawn(worker.run(tokio::io::BufReader::new(reader), rx));

        writer.write_all(format!("{REQUEST}\n").as_bytes()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.events.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first line stored");

        tx.send(true).unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker stops")
            .expect("join");

        assert!(matches!(report.outcome, IngestOutcome::Cancelled));
        assert_eq!(report.stats.stored, 1);
        assert_eq!(*state.borrow_and_update(), IngestState::Stopped);
        drop(writer);
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_reads_to_the_end() {
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let input = format!("{REQUEST}\n{REQUEST}\n");
        let report = IngestWorker::new(registry(), sink)
            .run(input.as_bytes(), rx)
            .await;
        assert!(matches!(report.outcome, IngestOutcome::Exhausted));
        assert_eq!(report.stats.stored, 2);
    }

    #[tokio::test]
    async fn store_failures_are_counted_not_fatal() {
        let (_tx, rx) = watch::channel(false);
        let policy = AppendPolicy::default()
            .with_max_attempts(2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(1));
        let input = format!("{REQUEST}\n{REQUEST}\n");
        let report = IngestWorker::new(registry(), Arc::new(BrokenSink))
            .with_policy(policy)
            .run(input.as_bytes(), rx)
            .await;
        assert!(matches!(report.outcome, IngestOutcome::Exhausted));
        assert_eq!(report.stats.dropped, 2);
        assert_eq!(report.stats.stored, 0);
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_stop_ingestion() {
        let mut input = format!("{REQUEST}\n").into_bytes();
        input.extend_from_slice(
            b"2024-01-01 10:00:01 10.0.0.5 10.0.0.6 => GET svc:8080 /caf\xe9 - 200 OK\n",
        );
        input.extend_from_slice(format!("{REQUEST}\r\n{REQUEST}\n").as_bytes());

        let sink = Arc::new(MemorySink::default());
        let (_tx, rx) = watch::channel(false);
        let report = IngestWorker::new(registry(), sink.clone())
            .run(input.as_slice(), rx)
            .await;

        assert!(matches!(report.outcome, IngestOutcome::Exhausted));
        assert_eq!(report.stats.lines, 4);
        assert_eq!(report.stats.stored, 4);
        assert_eq!(report.stats.malformed, 0);
        let events = sink.events.lock().unwrap().clone();
        assert_eq!(events[1].path, "/caf\u{fffd}");
        assert_eq!(events[1].to, "A");
        assert_eq!(events[2].status, "OK");
    }

    #[test]
    fn new_worker_has_not_started() {
        let worker = IngestWorker::new(registry(), Arc::new(MemorySink::default()));
        assert_eq!(*worker.subscribe().borrow(), IngestState::NotStarted);
    }
}
