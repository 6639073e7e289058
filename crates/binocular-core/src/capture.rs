//! Parser for capture tool output.
//!
//! The capture tool prints one HTTP transaction per line as 11
//! whitespace-separated fields:
//!
//! ```text
//! date time source destination way method host path - code status
//! 2024-01-01 10:00:00 10.0.0.5 10.0.0.6 > GET svc:8080 /api/foo - 200 OK
//! ```
//!
//! A bad timestamp or status code degrades to a default value. Only a line
//! with too few fields is rejected.

use binocular_common::constants::CAPTURE_TIME_FORMAT;
use binocular_common::error::{BinocularError, Result};
use binocular_common::types::Direction;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Status code recorded when the capture field is not an integer.
pub const UNKNOWN_STATUS_CODE: i32 = -1;

/// One parsed capture line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    /// When the transaction was observed (epoch if unparseable).
    pub timestamp: DateTime<Utc>,
    /// Source address.
    pub source: String,
    /// Destination address.
    pub destination: String,
    /// Raw direction marker.
    pub way: String,
    /// HTTP method.
    pub method: String,
    /// Host header, `host[:port]`.
    pub host: String,
    /// Request path.
    pub path: String,
    /// Numeric status code, or [`UNKNOWN_STATUS_CODE`].
    pub code: i32,
    /// Status text.
    pub status: String,
}

impl CaptureRecord {
    /// Classifies the record's direction marker.
    pub fn direction(&self) -> Direction {
        Direction::from_marker(&self.way)
    }
}

/// Parses one capture line.
///
/// Fields beyond the eleventh are ignored.
///
/// # Errors
///
/// Returns [`BinocularError::MalformedLine`] if the line has fewer than
/// 11 fields.
pub fn parse_line(line: &str) -> Result<CaptureRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [date, time, source, destination, way, method, host, path, _, code, status, ..] =
        fields.as_slice()
    else {
        return Err(BinocularError::MalformedLine {
            fields: fields.len(),
            line: line.trim().to_owned(),
        });
    };

    Ok(CaptureRecord {
        timestamp: parse_timestamp(date, time),
        source: (*source).to_owned(),
        destination: (*destination).to_owned(),
        way: (*way).to_owned(),
        method: (*method).to_owned(),
        host: (*host).to_owned(),
        path: (*path).to_owned(),
        code: parse_code(code),
        status: (*status).to_owned(),
    })
}

/// Parses the date and time fields as UTC, falling back to the Unix epoch.
pub fn parse_timestamp(date: &str, time: &str) -> DateTime<Utc> {
    let joined = format!("{date} {time}");
    NaiveDateTime::parse_from_str(&joined, CAPTURE_TIME_FORMAT).map_or_else(
        |e| {
            tracing::debug!(timestamp = %joined, error = %e, "unparseable capture timestamp");
            DateTime::<Utc>::default()
        },
        |naive| naive.and_utc(),
    )
}

fn parse_code(code: &str) -> i32 {
    code.parse().unwrap_or(UNKNOWN_STATUS_CODE)
}
