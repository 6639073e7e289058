//! # binocular-server
//!
//! Read-only HTTP surface over the event store.
//!
//! # Endpoints
//!
//! - `GET /logs` - every stored event as a JSON array, in write order
//! - `GET /health` - liveness and stored event count
//!
//! Anything else answers `404`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod server;

pub use server::{QueryServer, router};
