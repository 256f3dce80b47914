//! Server state shared across sessions.
//!
//! Everything here is immutable after startup, so sessions share it
//! through an `Arc` with no locking.

use std::time::Duration;

use vless_proto::Secret;

use crate::config::Config;
use crate::policy::AddressPolicy;

#[derive(Debug, Clone)]
pub struct ServerState {
    pub secret: Secret,
    pub policy: AddressPolicy,
    pub handshake_timeout: Duration,
    pub dial_timeout: Duration,
    pub close_grace: Duration,
    pub relay_buffer_size: usize,
    pub max_header_bytes: usize,
    pub max_frame_bytes: usize,
}

impl ServerState {
    pub fn from_config(config: &Config, secret: Secret) -> Self {
        Self {
            secret,
            policy: AddressPolicy::from_config(&config.policy),
            handshake_timeout: Duration::from_secs(config.server.handshake_timeout_secs),
            dial_timeout: Duration::from_secs(config.server.dial_timeout_secs),
            close_grace: Duration::from_secs(config.server.close_grace_secs),
            relay_buffer_size: config.server.relay_buffer_size,
            max_header_bytes: config.server.max_header_bytes,
            max_frame_bytes: config.server.max_frame_bytes,
        }
    }
}
