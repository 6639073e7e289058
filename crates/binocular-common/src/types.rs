//! Domain primitive types used across the Binocular workspace.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a running workload (container id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    /// Creates a new workload ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network identity of a running workload, as seen at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    /// Workload identity.
    pub id: WorkloadId,
    /// Host-facing ports published by the workload.
    #[serde(default)]
    pub ports: BTreeSet<u16>,
    /// Internal network address (empty when the workload has none).
    #[serde(default)]
    pub address: String,
}

impl WorkloadRef {
    /// Creates a workload reference.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        ports: impl IntoIterator<Item = u16>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: WorkloadId::new(id),
            ports: ports.into_iter().collect(),
            address: address.into(),
        }
    }
}

/// Traffic direction marker emitted by the capture tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server (`>`).
    Request,
    /// Server to client (`<`).
    Response,
}

impl Direction {
    /// Character marking the response direction.
    pub const RESPONSE_MARKER: char = '<';

    /// Classifies a raw marker. Markers pointing left (`<`, `<=`) denote a
    /// response; anything else is treated as the forward direction.
    #[must_use]
    pub fn from_marker(marker: &str) -> Self {
        if marker.contains(Self::RESPONSE_MARKER) {
            Self::Response
        } else {
            Self::Request
        }
    }

    /// Returns whether records in this direction become events.
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Request)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
        }
    }
}
