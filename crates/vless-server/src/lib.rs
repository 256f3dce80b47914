//! VLESS-over-WebSocket proxy endpoint.
//!
//! Accepts plain-HTTP connections, upgrades WebSocket requests into
//! tunnel sessions, authenticates the binary handshake, applies the
//! address-override policy, and relays bytes between the client and
//! the dialed destination. Non-upgrade visitors get a landing page.

pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod server;
pub mod session;
pub mod state;
pub mod util;
pub mod ws;

pub use config::{apply_overrides, load_config, resolve_secret, CliOverrides, Config};
pub use error::ServerError;
pub use policy::AddressPolicy;
pub use server::{run, serve};
pub use state::ServerState;
pub use tokio_util::sync::CancellationToken;
