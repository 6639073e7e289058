//! # binocular-ingest
//!
//! The I/O side of ingestion:
//! - [`discovery`]: one-shot workload inventory at startup.
//! - [`capture`]: launching the capture tool and exposing its stdout.
//! - [`worker`]: the cancellable loop that parses, attributes, and stores.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod capture;
pub mod discovery;
pub mod worker;
