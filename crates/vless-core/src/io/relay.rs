//! Bidirectional relay between the client transport and the
//! destination stream.
//!
//! Each direction is driven as an independent poll-based state machine
//! within a single future, so back-pressure on one direction never
//! stalls the other. Bytes within one direction are delivered in
//! order; the two directions are independent channels.
//!
//! When one direction observes EOF (or finishes shutting down its
//! writer), the other direction gets a bounded grace period to drain
//! before the whole session is torn down. The relay never blocks
//! indefinitely waiting on a half-closed side.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// Bytes transferred by a completed relay, per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayTotals {
    /// Client transport -> destination stream.
    pub to_destination: u64,
    /// Destination stream -> client transport.
    pub to_client: u64,
}

/// State machine for one directional copy: read, write, flush.
enum CopyState {
    Reading,
    Writing(usize, usize), // (pos, len)
    Flushing(usize),
    ShuttingDown,
    Done,
}

enum CopyPoll {
    /// Data was flushed through; contains the byte count.
    Flushed(usize),
    /// EOF observed and the peer writer shut down.
    Finished,
}

fn poll_copy_direction<R, W>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    state: &mut CopyState,
) -> Poll<io::Result<CopyPoll>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        match state {
            CopyState::Reading => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            *state = CopyState::ShuttingDown;
                        } else {
                            *state = CopyState::Writing(0, n);
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Writing(pos, len) => {
                match Pin::new(&mut *writer).poll_write(cx, &buf[*pos..*len]) {
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= *len {
                            let total = *len;
                            *state = CopyState::Flushing(total);
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Flushing(bytes) => {
                let bytes = *bytes;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = CopyState::Reading;
                        return Poll::Ready(Ok(CopyPoll::Flushed(bytes)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::ShuttingDown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *state = CopyState::Done;
                    return Poll::Ready(Ok(CopyPoll::Finished));
                }
                Poll::Pending => return Poll::Pending,
            },
            CopyState::Done => return Poll::Ready(Ok(CopyPoll::Finished)),
        }
    }
}

/// Relay bytes in both directions until both sides close.
///
/// Returns the per-direction byte totals. A mid-relay I/O error on
/// either side ends the relay with that error; the caller treats it
/// as session teardown, not a crash.
pub async fn relay_duplex<A, B>(
    client: A,
    destination: B,
    close_grace: Duration,
    buffer_size: usize,
) -> io::Result<RelayTotals>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_r, mut client_w) = tokio::io::split(client);
    let (mut dest_r, mut dest_w) = tokio::io::split(destination);

    let mut buf_up = vec![0u8; buffer_size];
    let mut buf_down = vec![0u8; buffer_size];
    let mut state_up = CopyState::Reading;
    let mut state_down = CopyState::Reading;

    let mut up_done = false;
    let mut down_done = false;
    let mut totals = RelayTotals::default();

    let grace_sleep = tokio::time::sleep(close_grace);
    tokio::pin!(grace_sleep);
    let mut closing = false;

    loop {
        if up_done && down_done {
            return Ok(totals);
        }

        // Poll both directions in one future. Each registers its own
        // waker, so progress on one never depends on the other.
        let both = std::future::poll_fn(|cx| {
            let mut any_ready = false;
            let mut error: Option<io::Error> = None;

            if !up_done {
                match poll_copy_direction(cx, &mut client_r, &mut dest_w, &mut buf_up, &mut state_up)
                {
                    Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                        totals.to_destination += n as u64;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        up_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(e)) => {
                        error = Some(e);
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if !down_done {
                match poll_copy_direction(
                    cx,
                    &mut dest_r,
                    &mut client_w,
                    &mut buf_down,
                    &mut state_down,
                ) {
                    Poll::Ready(Ok(CopyPoll::Flushed(n))) => {
                        totals.to_client += n as u64;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        down_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(e)) => {
                        error = Some(e);
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if let Some(e) = error {
                return Poll::Ready(Err(e));
            }
            if any_ready {
                Poll::Ready(Ok(up_done || down_done))
            } else {
                Poll::Pending
            }
        });

        tokio::select! {
            result = both => {
                let half_closed = result?;
                if !closing && half_closed {
                    closing = true;
                    grace_sleep.as_mut().reset(Instant::now() + close_grace);
                }
            }
            _ = &mut grace_sleep, if closing => {
                // The surviving direction did not drain within the
                // grace period; drop both halves.
                return Ok(totals);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn relays_both_directions() {
        let (mut client, transport_side) = duplex(1024);
        let (dest_side, mut dest) = duplex(1024);

        let relay = tokio::spawn(relay_duplex(
            transport_side,
            dest_side,
            Duration::from_secs(5),
            1024,
        ));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        dest.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        dest.write_all(b"world").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        client.shutdown().await.unwrap();
        // The relay propagates the EOF to the destination writer.
        assert_eq!(dest.read(&mut buf).await.unwrap(), 0);
        dest.shutdown().await.unwrap();

        let totals = relay.await.unwrap().unwrap();
        assert_eq!(totals.to_destination, 5);
        assert_eq!(totals.to_client, 5);
    }

    #[tokio::test]
    async fn grace_period_bounds_the_surviving_direction() {
        let (mut client, transport_side) = duplex(1024);
        let (dest_side, dest) = duplex(1024);

        client.shutdown().await.unwrap(); // client -> destination hits EOF

        let start = Instant::now();
        let totals = relay_duplex(
            transport_side,
            dest_side,
            Duration::from_millis(50),
            1024,
        )
        .await
        .unwrap();
        // Destination never closed; the grace period must cut it off.
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(totals.to_destination, 0);

        drop(dest);
    }

    #[tokio::test]
    async fn ordered_delivery_within_a_direction() {
        let (client, transport_side) = duplex(8);
        let (dest_side, mut dest) = duplex(8);

        let relay = tokio::spawn(relay_duplex(
            transport_side,
            dest_side,
            Duration::from_secs(5),
            4, // tiny buffer forces many read/write cycles
        ));

        let payload: Vec<u8> = (0..=255u8).collect();
        let writer = {
            let payload = payload.clone();
            tokio::spawn(async move {
                let mut client = client;
                client.write_all(&payload).await.unwrap();
                client.shutdown().await.unwrap();
            })
        };

        let mut received = vec![0u8; payload.len()];
        dest.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        writer.await.unwrap();
        dest.shutdown().await.unwrap();
        let _ = relay.await.unwrap();
    }
}
