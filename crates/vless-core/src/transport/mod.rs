//! Transport adapters.

mod ws;

pub use ws::WsIo;
