//! Unified error types for the Binocular workspace.
//!
//! Library crates return [`BinocularError`]; the binary wraps it in
//! `anyhow` with additional context.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BinocularError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Two workloads claim the same registry key.
    #[error("duplicate {kind} {key}: claimed by {first} and {second}")]
    DuplicateKey {
        /// Index the collision happened in (`port` or `address`).
        kind: &'static str,
        /// The contested key.
        key: String,
        /// Workload that claimed the key first.
        first: String,
        /// Workload that claimed the key second.
        second: String,
    },

    /// A capture line did not carry the expected number of fields.
    #[error("malformed capture line ({fields} fields): {line}")]
    MalformedLine {
        /// Number of whitespace-separated fields found.
        fields: usize,
        /// The offending line.
        line: String,
    },

    /// The capture subprocess could not be launched or read.
    #[error("capture error: {message}")]
    Capture {
        /// Description of the failure.
        message: String,
    },

    /// Workload inspection failed.
    #[error("workload inspection failed: {message}")]
    Inspect {
        /// Description of the failure.
        message: String,
    },

    /// The event store rejected an operation.
    #[error("event store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BinocularError>;
