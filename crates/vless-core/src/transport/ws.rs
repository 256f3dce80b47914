//! WebSocket stream adapter.
//!
//! `WsIo` wraps a `WebSocketStream` and exposes it as
//! `AsyncRead + AsyncWrite` over binary frames, so the relay and the
//! handshake reader can treat the client transport like any byte
//! stream. Close frames and closed-connection errors read as EOF, and
//! writes attempted after the peer closed are silently dropped rather
//! than surfaced as failures.

use std::borrow::Cow;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use futures_util::{Sink, SinkExt, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::{
    tungstenite::{
        protocol::frame::coding::CloseCode, protocol::CloseFrame, Error as WsError, Message,
    },
    WebSocketStream,
};

pub struct WsIo<S> {
    ws: WebSocketStream<S>,
    read_buf: Bytes,
    peer_closed: bool,
}

impl<S> WsIo<S> {
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            read_buf: Bytes::new(),
            peer_closed: false,
        }
    }
}

impl<S> WsIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Close the transport with a normal-closure code and a short
    /// reason string. Errors are ignored; the peer may already be gone.
    pub async fn close(&mut self, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Owned(reason.to_owned()),
        };
        let _ = self.ws.close(Some(frame)).await;
        let _ = self.ws.flush().await;
        self.peer_closed = true;
    }

    fn fill_from(&mut self, data: Bytes, buf: &mut ReadBuf<'_>) {
        self.read_buf = data;
        let n = self.read_buf.len().min(buf.remaining());
        buf.put_slice(&self.read_buf[..n]);
        self.read_buf.advance(n);
    }
}

/// Whether a tungstenite error means the connection is simply gone.
fn is_closed(err: &WsError) -> bool {
    matches!(err, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

fn ws_err(err: WsError) -> std::io::Error {
    std::io::Error::other(err)
}

impl<S> AsyncRead for WsIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        // Drain leftovers from the previous frame first.
        if !self.read_buf.is_empty() {
            let n = self.read_buf.len().min(buf.remaining());
            let chunk = self.read_buf.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        if self.peer_closed {
            return Poll::Ready(Ok(()));
        }

        loop {
            match Pin::new(&mut self.ws).poll_next(cx) {
                Poll::Ready(Some(Ok(msg))) => match msg {
                    Message::Binary(data) => {
                        self.fill_from(Bytes::from(data), buf);
                        return Poll::Ready(Ok(()));
                    }
                    Message::Text(text) => {
                        self.fill_from(Bytes::from(text.into_bytes()), buf);
                        return Poll::Ready(Ok(()));
                    }
                    Message::Ping(payload) => {
                        let mut ws = Pin::new(&mut self.ws);
                        match ws.as_mut().poll_ready(cx) {
                            Poll::Ready(Ok(())) => {
                                if let Err(err) = ws.start_send(Message::Pong(payload)) {
                                    if is_closed(&err) {
                                        self.peer_closed = true;
                                        return Poll::Ready(Ok(()));
                                    }
                                    return Poll::Ready(Err(ws_err(err)));
                                }
                                continue;
                            }
                            Poll::Ready(Err(err)) => return Poll::Ready(Err(ws_err(err))),
                            Poll::Pending => return Poll::Pending,
                        }
                    }
                    Message::Pong(_) => continue,
                    Message::Close(_) => {
                        self.peer_closed = true;
                        return Poll::Ready(Ok(()));
                    }
                    Message::Frame(_) => continue,
                },
                Poll::Ready(Some(Err(err))) if is_closed(&err) => {
                    self.peer_closed = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Err(ws_err(err))),
                Poll::Ready(None) => {
                    self.peer_closed = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for WsIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        // A closed peer swallows writes; the session is already on its
        // way down and the reader side will observe the close.
        if self.peer_closed {
            return Poll::Ready(Ok(data.len()));
        }
        let mut ws = Pin::new(&mut self.ws);
        match ws.as_mut().poll_ready(cx) {
            Poll::Ready(Ok(())) => match ws.start_send(Message::Binary(data.to_vec())) {
                Ok(()) => Poll::Ready(Ok(data.len())),
                Err(err) if is_closed(&err) => {
                    self.peer_closed = true;
                    Poll::Ready(Ok(data.len()))
                }
                Err(err) => Poll::Ready(Err(ws_err(err))),
            },
            Poll::Ready(Err(err)) if is_closed(&err) => {
                self.peer_closed = true;
                Poll::Ready(Ok(data.len()))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(ws_err(err))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.peer_closed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut self.ws).poll_flush(cx) {
            Poll::Ready(Err(err)) if is_closed(&err) => {
                self.peer_closed = true;
                Poll::Ready(Ok(()))
            }
            other => other.map_err(ws_err),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.peer_closed {
            return Poll::Ready(Ok(()));
        }
        match Pin::new(&mut self.ws).poll_close(cx) {
            Poll::Ready(Err(err)) if is_closed(&err) => {
                self.peer_closed = true;
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Ok(())) => {
                self.peer_closed = true;
                Poll::Ready(Ok(()))
            }
            other => other.map_err(ws_err),
        }
    }
}
