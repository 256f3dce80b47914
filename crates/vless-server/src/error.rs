//! Server error types.

use std::borrow::Cow;

use vless_proto::ParseError;

/// Server error type. Every variant is local to one session (or to
/// startup); nothing here is ever retried.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake: {}", .0.reason())]
    Proto(ParseError),
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("dial {dest} failed: {source}")]
    Dial {
        dest: String,
        source: std::io::Error,
    },
    #[error("dial {0} timed out")]
    DialTimeout(String),
    #[error("config: {0}")]
    Config(String),
}

impl ServerError {
    /// Short human-readable reason for the close frame sent to the
    /// client. The wire protocol has no error frame; this is the only
    /// diagnostic a client sees.
    pub fn close_reason(&self) -> Cow<'static, str> {
        match self {
            ServerError::Io(_) => Cow::Borrowed("transport error"),
            ServerError::Proto(e) => Cow::Borrowed(e.reason()),
            ServerError::HandshakeTimeout => Cow::Borrowed("handshake timed out"),
            ServerError::Dial { .. } | ServerError::DialTimeout(_) => {
                Cow::Borrowed("connection failed")
            }
            ServerError::Config(_) => Cow::Borrowed("server misconfigured"),
        }
    }
}

impl From<ParseError> for ServerError {
    fn from(e: ParseError) -> Self {
        ServerError::Proto(e)
    }
}
