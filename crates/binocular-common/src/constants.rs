//! System-wide constants and default values.

/// Default network interface the capture tool listens on.
pub const DEFAULT_INTERFACE: &str = "docker0";

/// Default store file, relative to the working directory.
pub const DEFAULT_DB_FILE: &str = "binocular.db";

/// Default listen address of the query server.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default capture binary, resolved through `PATH`.
pub const DEFAULT_CAPTURE_BINARY: &str = "httpry";

/// Name of the collection holding traffic events.
pub const EVENTS_TABLE: &str = "logs";

/// Destination port assumed when a host header carries no port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Timestamp layout of the date and time capture fields.
pub const CAPTURE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default number of store write attempts per event.
pub const DEFAULT_APPEND_ATTEMPTS: u32 = 3;

/// Default delay before the first store write retry, in milliseconds.
pub const DEFAULT_APPEND_BACKOFF_MS: u64 = 50;

/// Upper bound on the store write retry delay, in milliseconds.
pub const DEFAULT_APPEND_MAX_BACKOFF_MS: u64 = 2_000;
