//! # binocular-store
//!
//! Durable persistence for traffic events.
//!
//! Events live in a single redb table keyed by monotonic ULIDs, so a plain
//! table scan returns them in write order. Writes go through an
//! [`policy::AppendPolicy`] that retries and dead-letters instead of
//! silently losing events.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod dead_letter;
pub mod key;
pub mod policy;
pub mod store;

pub use key::EventKey;
pub use store::{EventSink, EventStore};
