//! Attribution of capture records to workloads.

use crate::capture::CaptureRecord;
use crate::event::TrafficEvent;
use crate::registry::Registry;

/// Turns a forward-direction record into a [`TrafficEvent`].
///
/// The destination is resolved from the host header's port and the source
/// from the source address. A miss leaves the id empty and is logged; it is
/// never an error.
pub fn attribute(record: CaptureRecord, registry: &Registry) -> TrafficEvent {
    let to = match registry.resolve_destination(&record.host) {
        Ok(Some(w)) => w.id.to_string(),
        Ok(None) => {
            tracing::warn!(host = %record.host, "no workload publishes destination port");
            String::new()
        }
        Err(e) => {
            tracing::warn!(host = %record.host, error = %e, "unparseable destination port");
            String::new()
        }
    };

    let from = registry.resolve_source(&record.source).map_or_else(
        || {
            tracing::warn!(src = %record.source, "no workload owns source address");
            String::new()
        },
        |w| w.id.to_string(),
    );

    TrafficEvent {
        time: record.timestamp,
        from,
        to,
        src: record.source,
        dst: record.destination,
        way: record.way,
        method: record.method,
        host: record.host,
        path: record.path,
        code: record.code,
        status: record.status,
    }
}
