//! # binocular-core
//!
//! The pure part of Binocular: everything between a raw capture line and
//! the event that gets persisted.
//!
//! - [`registry`]: immutable port and address lookup built at startup.
//! - [`capture`]: parser for the capture tool's 11-field line format.
//! - [`attribution`]: resolves source and destination workloads.
//! - [`event`]: the persisted [`event::TrafficEvent`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod attribution;
pub mod capture;
pub mod event;
pub mod registry;
