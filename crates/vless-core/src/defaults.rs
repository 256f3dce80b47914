//! Default configuration values.
//!
//! Centralized default constants for use across the workspace.

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Default handshake read timeout in seconds. Bounds a stalled or
/// hostile client that upgrades but never sends a complete header.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Default outbound dial timeout in seconds.
pub const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 10;
/// Default grace period after one relay direction closes before the
/// whole session is torn down.
pub const DEFAULT_CLOSE_GRACE_SECS: u64 = 5;
/// Default graceful shutdown drain timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default relay read-buffer size.
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;
/// Default cap on buffered handshake bytes.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8192;
/// Default max WebSocket frame size.
pub const DEFAULT_WS_MAX_FRAME_BYTES: usize = 1 << 20;
/// Default TCP listener backlog.
pub const DEFAULT_CONNECTION_BACKLOG: u32 = 1024;

/// Destination suffixes that are rewritten to the fallback relay to
/// prevent proxy loops through the hosting platform's own domains.
pub const DEFAULT_FORBIDDEN_SUFFIXES: &[&str] = &[".workers.dev", ".pages.dev"];
/// Default fallback relay host for rewritten destinations.
pub const DEFAULT_FALLBACK_HOST: &str = "1.1.1.1";
/// Default fallback relay port for rewritten destinations.
pub const DEFAULT_FALLBACK_PORT: u16 = 80;

/// Environment variable holding the shared secret in hosted deployments.
pub const SECRET_ENV_VAR: &str = "VLESS_SECRET";
