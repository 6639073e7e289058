//! The persisted traffic event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An attributed HTTP request, as stored and served.
///
/// `from` and `to` hold workload ids and are empty when unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficEvent {
    /// When the request was observed.
    pub time: DateTime<Utc>,
    /// Source workload id.
    pub from: String,
    /// Destination workload id.
    pub to: String,
    /// Raw source address.
    pub src: String,
    /// Raw destination address.
    pub dst: String,
    /// Raw direction marker.
    pub way: String,
    /// HTTP method.
    pub method: String,
    /// Host header.
    pub host: String,
    /// Request path.
    pub path: String,
    /// Status code, `-1` when unknown.
    pub code: i32,
    /// Status text.
    pub status: String,
}

impl fmt::Display for TrafficEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} {} -> {}",
            self.from, self.method, self.path, self.to
        )
    }
}
