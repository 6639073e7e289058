//! End-to-end ingestion tests.
//!
//! Inventory file -> registry -> worker -> redb store, with no capture
//! subprocess involved.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use binocular_common::config::DuplicatePolicy;
use binocular_common::error::{BinocularError, Result};
use binocular_core::event::TrafficEvent;
use binocular_core::registry::Registry;
use binocular_ingest::discovery::{InventoryFile, WorkloadSource};
use binocular_ingest::worker::{IngestOutcome, IngestWorker};
use binocular_store::dead_letter::DeadLetterFile;
use binocular_store::policy::AppendPolicy;
use binocular_store::{EventKey, EventSink, EventStore};
use tokio::sync::watch;

const REQUEST: &str = "2024-01-01 10:00:00 10.0.0.5 10.0.0.6 => GET svc:8080 /api/foo - 200 OK";
const RESPONSE: &str = "2024-01-01 10:00:00 10.0.0.6 10.0.0.5 <= GET svc:8080 /api/foo - 200 OK";

fn registry(dir: &tempfile::TempDir) -> Arc<Registry> {
    let path = dir.path().join("workloads.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "A", "ports": [8080]},
            {"id": "B", "address": "10.0.0.5"}
        ]"#,
    )
    .expect("write inventory");
    let workloads = InventoryFile::new(path).list_workloads().expect("inventory");
    Arc::new(Registry::build(workloads, DuplicatePolicy::LastWins).expect("registry"))
}

async fn ingest_into(store: &EventStore, registry: Arc<Registry>, input: &str) {
    let (_tx, rx) = watch::channel(false);
    let report = IngestWorker::new(registry, Arc::new(store.clone()))
        .run(input.as_bytes(), rx)
        .await;
    assert!(matches!(report.outcome, IngestOutcome::Exhausted));
}

// ── Attribution ─────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_request_is_attributed_and_stored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = EventStore::open(&dir.path().join("binocular.db")).expect("open");
    ingest_into(&store, registry(&dir), &format!("{REQUEST}\n")).await;

    let events = store.list_all().expect("list");
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.from, "B");
    assert_eq!(event.to, "A");
    assert_eq!(event.src, "10.0.0.5");
    assert_eq!(event.dst, "10.0.0.6");
    assert_eq!(event.method, "GET");
    assert_eq!(event.host, "svc:8080");
    assert_eq!(event.path, "/api/foo");
    assert_eq!(event.code, 200);
    assert_eq!(event.status, "OK");
}

#[tokio::test]
async fn pipeline_response_leaves_store_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = EventStore::open(&dir.path().join("binocular.db")).expect("open");
    let registry = registry(&dir);
    ingest_into(&store, Arc::clone(&registry), &format!("{REQUEST}\n")).await;
    assert_eq!(store.len().expect("len"), 1);

    ingest_into(&store, registry, &format!("{RESPONSE}\n")).await;
    assert_eq!(store.len().expect("len"), 1);
}

#[tokio::test]
async fn pipeline_unknown_port_keeps_empty_destination() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = EventStore::open(&dir.path().join("binocular.db")).expect("open");
    let line = REQUEST.replace("svc:8080", "svc:9090");
    ingest_into(&store, registry(&dir), &format!("{line}\n")).await;

    let events = store.list_all().expect("list");
    assert_eq!(events[0].to, "");
    assert_eq!(events[0].from, "B");
}

// ── Ordering ────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_listing_follows_capture_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = EventStore::open(&dir.path().join("binocular.db")).expect("open");
    let input: String = (0..20)
        .map(|i| format!("{}\n", REQUEST.replace("/api/foo", &format!("/item/{i}"))))
        .collect();
    ingest_into(&store, registry(&dir), &input).await;

    let paths: Vec<String> = store
        .list_all()
        .expect("list")
        .into_iter()
        .map(|e| e.path)
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("/item/{i}")).collect();
    assert_eq!(paths, expected);
}

// ── Dead letters ────────────────────────────────────────────────────

struct RefusingSink;

impl EventSink for RefusingSink {
    fn append(&self, _event: &TrafficEvent) -> Result<EventKey> {
        Err(BinocularError::Store {
            message: "disk full".into(),
        })
    }
}

#[tokio::test]
async fn pipeline_refused_events_reach_the_dead_letter_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dead = DeadLetterFile::new(dir.path().join("dead.jsonl"));
    let policy = AppendPolicy::default()
        .with_max_attempts(2)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
        .with_dead_letter(dead.clone());

    let (_tx, rx) = watch::channel(false);
    let input = format!("{REQUEST}\n{RESPONSE}\n{REQUEST}\n");
    let report = IngestWorker::new(registry(&dir), Arc::new(RefusingSink))
        .with_policy(policy)
        .run(input.as_bytes(), rx)
        .await;

    assert_eq!(report.stats.dead_lettered, 2);
    assert_eq!(report.stats.stored, 0);
    assert_eq!(report.stats.responses, 1);

    let parked = dead.read_all().expect("read dead letters");
    assert_eq!(parked.len(), 2);
    assert_eq!(parked[0].from, "B");
    assert_eq!(parked[0].to, "A");
}
