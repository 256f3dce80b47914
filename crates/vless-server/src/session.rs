//! Relay session lifecycle.
//!
//! One session pairs one upgraded client transport with one outbound
//! destination stream: `Handshaking -> Relaying -> Closing -> Closed`.
//! Handshake failures and dial failures close the transport with a
//! normal-closure code and a short reason before the destination is
//! ever opened (or after the dial attempt, respectively). Mid-relay
//! errors begin joint teardown and are logged, never propagated as a
//! crash.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};
use vless_core::{relay_duplex, WsIo};
use vless_proto::{Assembled, Destination, Handshake, HeaderAssembler, RESPONSE};

use crate::error::ServerError;
use crate::state::ServerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Handshaking,
    Relaying,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Handshaking => write!(f, "handshaking"),
            SessionState::Relaying => write!(f, "relaying"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Drive one session to completion and close the transport.
pub async fn run_session<S>(
    ws: WebSocketStream<S>,
    state: Arc<ServerState>,
    peer: std::net::SocketAddr,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut transport = WsIo::new(ws);
    let mut session = SessionState::Handshaking;
    debug!(peer = %peer, state = %session, "session started");

    let (handshake, early_data) = match timeout(
        state.handshake_timeout,
        read_handshake(&mut transport, &state),
    )
    .await
    {
        Ok(Ok(v)) => v,
        Ok(Err(err)) => {
            session = SessionState::Closed;
            warn!(peer = %peer, state = %session, error = %err, "handshake failed");
            transport.close(&err.close_reason()).await;
            return Err(err);
        }
        Err(_) => {
            let err = ServerError::HandshakeTimeout;
            session = SessionState::Closed;
            warn!(peer = %peer, state = %session, "handshake timed out");
            transport.close(&err.close_reason()).await;
            return Err(err);
        }
    };

    let requested = handshake.destination.clone();
    let dest = state.policy.resolve(handshake.destination);
    if dest != requested {
        debug!(peer = %peer, requested = %requested, rewritten = %dest, "destination rewritten by policy");
    }

    let mut outbound = match dial(&dest, &state).await {
        Ok(stream) => stream,
        Err(err) => {
            session = SessionState::Closed;
            warn!(peer = %peer, state = %session, dest = %dest, error = %err, "dial failed");
            transport.close(&err.close_reason()).await;
            return Err(err);
        }
    };

    session = SessionState::Relaying;
    debug!(peer = %peer, state = %session, dest = %dest, early_bytes = early_data.len(), "session established");

    // Version echo must reach the client before any relayed payload.
    transport.write_all(&RESPONSE).await?;
    transport.flush().await?;

    if !early_data.is_empty() {
        outbound.write_all(&early_data).await?;
    }

    let result = relay_duplex(
        transport,
        outbound,
        state.close_grace,
        state.relay_buffer_size,
    )
    .await;

    session = SessionState::Closing;
    debug!(peer = %peer, state = %session, dest = %dest, "relay finished");
    match result {
        Ok(totals) => {
            session = SessionState::Closed;
            debug!(
                peer = %peer,
                state = %session,
                dest = %dest,
                bytes_up = totals.to_destination + early_data.len() as u64,
                bytes_down = totals.to_client,
                "session finished"
            );
            Ok(())
        }
        Err(err) => {
            session = SessionState::Closed;
            debug!(peer = %peer, state = %session, dest = %dest, error = %err, "session torn down");
            Ok(())
        }
    }
}

/// Pull transport chunks through the assembler until the header
/// decodes, handing back the handshake and any early data.
async fn read_handshake<T>(
    transport: &mut T,
    state: &ServerState,
) -> Result<(Handshake, Bytes), ServerError>
where
    T: AsyncRead + Unpin,
{
    let mut assembler = HeaderAssembler::new(state.secret, state.max_header_bytes);
    let mut chunk = vec![0u8; 4096];
    loop {
        let n = transport.read(&mut chunk).await?;
        if n == 0 {
            return Err(ServerError::Proto(assembler.finish()));
        }
        match assembler.push(&chunk[..n]) {
            Assembled::NeedMore => continue,
            Assembled::Ready {
                handshake,
                early_data,
            } => return Ok((handshake, early_data)),
            Assembled::Failed(e) => return Err(ServerError::Proto(e)),
        }
    }
}

/// Open the outbound stream, bounded by the dial timeout. No retries:
/// destinations are chosen once per session.
async fn dial(dest: &Destination, state: &ServerState) -> Result<TcpStream, ServerError> {
    match timeout(
        state.dial_timeout,
        TcpStream::connect((dest.host.as_str(), dest.port)),
    )
    .await
    {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ServerError::Dial {
            dest: dest.to_string(),
            source,
        }),
        Err(_) => Err(ServerError::DialTimeout(dest.to_string())),
    }
}
