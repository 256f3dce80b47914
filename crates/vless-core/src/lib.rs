//! Shared runtime pieces for the vless workspace.
//!
//! - [`defaults`] - default configuration constants
//! - [`io`] - prefixed-stream replay and the bidirectional relay
//! - [`transport`] - WebSocket `AsyncRead`/`AsyncWrite` adapter

pub mod defaults;
pub mod io;
pub mod transport;

pub use io::{relay_duplex, PrefixedStream, RelayTotals};
pub use transport::WsIo;
