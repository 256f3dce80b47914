//! HTTP entry point: WebSocket upgrade vs. plain page view.
//!
//! The listener speaks plain HTTP (TLS is terminated by the fronting
//! layer). Buffered request bytes are inspected without being
//! consumed; upgrade requests are completed with the buffered head
//! replayed through a `PrefixedStream`, and anything else gets the
//! informational landing page.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{Request, Response},
        protocol::WebSocketConfig,
    },
    WebSocketStream,
};
use tracing::debug;
use vless_core::PrefixedStream;

use crate::error::ServerError;

/// Initial buffer size for reading the HTTP request head.
pub const INITIAL_BUFFER_SIZE: usize = 2048;

const HTTP_HEADER_END: &[u8] = b"\r\n\r\n";

/// Page served to non-proxy visitors.
const LANDING_PAGE: &str = "<!doctype html>\n<html>\n<head><title>vless</title></head>\n<body><p>This is a VLESS proxy server.</p></body>\n</html>\n";

/// Result of inspecting buffered request bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inspect {
    /// Request head incomplete; read more.
    NeedMore,
    /// Valid WebSocket upgrade request.
    Upgrade,
    /// HTTP, but not an upgrade: serve the landing page.
    Page,
    /// Not HTTP at all.
    NotHttp,
}

/// Inspect buffered bytes for a WebSocket upgrade request.
pub fn inspect_request(buf: &[u8]) -> Inspect {
    let Some(header_end) = find_header_end(buf) else {
        return Inspect::NeedMore;
    };
    let Ok(head) = std::str::from_utf8(&buf[..header_end]) else {
        return Inspect::NotHttp;
    };
    let mut lines = head.split("\r\n");
    let Some(request_line) = lines.next() else {
        return Inspect::NotHttp;
    };
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let _path = parts.next().unwrap_or("");
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Inspect::NotHttp;
    }
    if method != "GET" {
        return Inspect::Page;
    }

    let mut upgrade = false;
    let mut connection_upgrade = false;
    let mut ws_key = false;

    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            match name.as_str() {
                "upgrade" => {
                    if value.to_ascii_lowercase().contains("websocket") {
                        upgrade = true;
                    }
                }
                "connection" => {
                    if value.to_ascii_lowercase().contains("upgrade") {
                        connection_upgrade = true;
                    }
                }
                "sec-websocket-key" => {
                    if !value.is_empty() {
                        ws_key = true;
                    }
                }
                _ => {}
            }
        }
    }

    if upgrade && connection_upgrade && ws_key {
        Inspect::Upgrade
    } else {
        Inspect::Page
    }
}

/// Complete the WebSocket upgrade, replaying the buffered head.
pub async fn accept_ws<S>(
    stream: S,
    initial: Bytes,
    max_frame_bytes: usize,
) -> Result<WebSocketStream<PrefixedStream<S>>, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let max_frame = if max_frame_bytes == 0 {
        None
    } else {
        Some(max_frame_bytes)
    };
    let ws_cfg = WebSocketConfig {
        max_frame_size: max_frame,
        max_message_size: max_frame,
        ..WebSocketConfig::default()
    };
    let prefixed = PrefixedStream::new(initial, stream);
    let ws = accept_hdr_async_with_config(
        prefixed,
        |req: &Request, resp: Response| {
            debug!(path = %req.uri().path(), "websocket upgrade");
            Ok(resp)
        },
        Some(ws_cfg),
    )
    .await
    .map_err(|e| {
        ServerError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("websocket handshake failed: {e}"),
        ))
    })?;
    Ok(ws)
}

/// Serve the informational page to a non-upgrade request.
pub async fn send_landing_page<S>(mut stream: S) -> Result<(), ServerError>
where
    S: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        LANDING_PAGE.len(),
        LANDING_PAGE
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Reject bytes that are not HTTP.
pub async fn send_bad_request<S>(mut stream: S) -> Result<(), ServerError>
where
    S: AsyncWrite + Unpin,
{
    let response = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    stream.write_all(response).await?;
    stream.shutdown().await?;
    Ok(())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HTTP_HEADER_END.len())
        .position(|w| w == HTTP_HEADER_END)
        .map(|idx| idx + HTTP_HEADER_END.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_request_detected() {
        let req = b"GET /tunnel HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        assert_eq!(inspect_request(req), Inspect::Upgrade);
    }

    #[test]
    fn plain_get_is_a_page_view() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(inspect_request(req), Inspect::Page);
    }

    #[test]
    fn post_is_a_page_view() {
        let req = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(inspect_request(req), Inspect::Page);
    }

    #[test]
    fn incomplete_head_needs_more() {
        let req = b"GET / HTTP/1.1\r\nHost: exa";
        assert_eq!(inspect_request(req), Inspect::NeedMore);
    }

    #[test]
    fn non_http_detected() {
        let req = b"\x16\x03\x01\x02\x00garbage\r\n\r\n";
        assert_eq!(inspect_request(req), Inspect::NotHttp);
    }

    #[test]
    fn upgrade_without_key_is_a_page_view() {
        let req =
            b"GET / HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        assert_eq!(inspect_request(req), Inspect::Page);
    }
}
