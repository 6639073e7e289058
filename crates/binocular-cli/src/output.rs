//! Formatted output helpers for CLI commands.
//!
//! Fixed-width table rows for stored events, with unattributed endpoints
//! shown as `-`.

use binocular_core::event::TrafficEvent;

/// Width of the path column before truncation.
const PATH_WIDTH: usize = 32;

/// Header row matching [`format_event_row`].
#[must_use]
pub fn event_header() -> String {
    format!(
        "{:<20} {:<16} {:<16} {:<7} {:<w$} {:<5}",
        "TIME",
        "FROM",
        "TO",
        "METHOD",
        "PATH",
        "CODE",
        w = PATH_WIDTH
    )
}

/// Formats one event as a table row.
#[must_use]
pub fn format_event_row(event: &TrafficEvent) -> String {
    format!(
        "{:<20} {:<16} {:<16} {:<7} {:<w$} {:<5}",
        event.time.format("%Y-%m-%d %H:%M:%S").to_string(),
        truncate(or_dash(&event.from), 16),
        truncate(or_dash(&event.to), 16),
        event.method,
        truncate(&event.path, PATH_WIDTH),
        event.code,
        w = PATH_WIDTH
    )
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

/// Shortens `value` to at most `width` characters, marking the cut with `~`.
#[must_use]
pub fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_owned();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}
