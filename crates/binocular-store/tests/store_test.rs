//! Integration tests for the event store under concurrent use.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;

use binocular_core::event::TrafficEvent;
use binocular_store::EventStore;
use chrono::{DateTime, TimeZone, Utc};

fn event(i: u32) -> TrafficEvent {
    TrafficEvent {
        time: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        from: format!("src-{i}"),
        to: "dst".into(),
        src: "10.0.0.5".into(),
        dst: "10.0.0.6".into(),
        way: ">".into(),
        method: "GET".into(),
        host: "svc:8080".into(),
        path: format!("/item/{i}"),
        code: 200,
        status: "OK".into(),
    }
}

#[test]
fn concurrent_appends_keep_every_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(EventStore::open(&dir.path().join("binocular.db")).expect("open"));

    let threads = 8;
    let per_thread = 25;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..per_thread)
                    .map(|i| store.append(&event(t * per_thread + i)).expect("append"))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let keys: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("thread"))
        .collect();
    let total = usize::try_from(threads * per_thread).unwrap();

    let distinct: HashSet<_> = keys.iter().collect();
    assert_eq!(distinct.len(), total);

    let stored = store.list_all().expect("list");
    assert_eq!(stored.len(), total);
    let paths: HashSet<String> = stored.into_iter().map(|e| e.path).collect();
    assert_eq!(paths.len(), total);
    assert_eq!(store.len().expect("len"), u64::try_from(total).unwrap());
}

#[test]
fn appended_events_roundtrip_field_for_field() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = EventStore::open(&dir.path().join("binocular.db")).expect("open");

    let mut inputs: Vec<TrafficEvent> = (0..10).map(event).collect();
    inputs[3].time = DateTime::<Utc>::default();
    inputs[4].code = -1;
    inputs[5].from.clear();
    for e in &inputs {
        let _ = store.append(e).expect("append");
    }

    assert_eq!(store.list_all().expect("list"), inputs);
}

#[test]
fn clones_share_one_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let writer = EventStore::open(&dir.path().join("binocular.db")).expect("open");
    let reader = writer.clone();

    let _ = writer.append(&event(1)).expect("append");
    assert_eq!(reader.list_all().expect("list"), vec![event(1)]);
}
