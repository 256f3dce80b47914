//! Accept loop and per-connection dispatch.
//!
//! Each accepted stream is sniffed for an HTTP request head first:
//! WebSocket upgrades become relay sessions, plain HTTP gets the
//! landing page, and anything else is rejected. Shutdown is
//! cooperative: the loop stops accepting on cancellation and then
//! waits for in-flight sessions to drain, up to a bound.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vless_core::defaults;

use crate::config::Config;
use crate::error::ServerError;
use crate::session::run_session;
use crate::state::ServerState;
use crate::util::{create_listener, ConnectionGuard, ConnectionTracker};
use crate::ws::{self, Inspect, INITIAL_BUFFER_SIZE};

/// Bind the configured address and serve until cancelled.
pub async fn run(
    config: &Config,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid listen address: {e}")))?;
    let listener = create_listener(addr, config.server.connection_backlog)?;
    serve(listener, state, config.server.max_connections, shutdown).await
}

/// Serve connections from an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    max_connections: Option<usize>,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let local = listener.local_addr()?;
    info!(addr = %local, "listening");

    let tracker = ConnectionTracker::new();
    let limiter = max_connections.map(|n| Arc::new(Semaphore::new(n)));

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                let permit = match &limiter {
                    Some(sem) => match sem.clone().try_acquire_owned() {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            debug!(peer = %peer, "connection limit reached, dropping");
                            continue;
                        }
                    },
                    None => None,
                };

                tracker.increment();
                let guard = ConnectionGuard::new(tracker.clone());
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    if let Err(e) = handle_conn(stream, peer, state).await {
                        debug!(peer = %peer, error = %e, "connection ended with error");
                    }
                });
            }
        }
    }

    info!(active = tracker.count(), "shutting down, draining sessions");
    let drained = tracker
        .wait_for_zero(Duration::from_secs(defaults::DEFAULT_SHUTDOWN_TIMEOUT_SECS))
        .await;
    if !drained {
        warn!(active = tracker.count(), "drain timed out, aborting remaining sessions");
    }
    Ok(())
}

/// Sniff the request head and dispatch the connection.
async fn handle_conn(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);

    loop {
        match ws::inspect_request(&buf) {
            Inspect::NeedMore => {
                if buf.len() >= state.max_header_bytes {
                    debug!(peer = %peer, "request head too large");
                    return ws::send_bad_request(stream).await;
                }
                let n = stream.read_buf(&mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
            }
            Inspect::Upgrade => {
                let ws = ws::accept_ws(stream, buf.freeze(), state.max_frame_bytes).await?;
                // Session failures are logged inside; the connection is done either way.
                let _ = run_session(ws, state, peer).await;
                return Ok(());
            }
            Inspect::Page => {
                debug!(peer = %peer, "serving landing page");
                return ws::send_landing_page(stream).await;
            }
            Inspect::NotHttp => {
                debug!(peer = %peer, "rejecting non-http bytes");
                return ws::send_bad_request(stream).await;
            }
        }
    }
}
