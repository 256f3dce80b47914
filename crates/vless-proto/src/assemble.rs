//! Early-data assembly.
//!
//! WebSocket transports deliver data as discrete pushed frames, while
//! the handshake parser wants a pull-style "give me the whole header"
//! view. `HeaderAssembler` buffers pushed chunks until the header
//! parses, then exposes whatever followed it as the first relay
//! payload. A chunk boundary may fall anywhere in the header,
//! including inside a domain name.

use bytes::{Bytes, BytesMut};

use crate::{parse_handshake, Handshake, ParseError, ParseResult, Secret};

/// Outcome of feeding a chunk into the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// Header still incomplete; feed the next chunk.
    NeedMore,
    /// Header decoded. `early_data` holds every buffered byte past the
    /// header boundary, none dropped or duplicated.
    Ready {
        handshake: Handshake,
        early_data: Bytes,
    },
    /// Fatal protocol error; close the session.
    Failed(ParseError),
}

/// Buffers inbound chunks until the handshake parser is satisfied.
#[derive(Debug)]
pub struct HeaderAssembler {
    secret: Secret,
    buf: BytesMut,
    max_header_bytes: usize,
}

impl HeaderAssembler {
    pub fn new(secret: Secret, max_header_bytes: usize) -> Self {
        Self {
            secret,
            buf: BytesMut::with_capacity(256),
            max_header_bytes,
        }
    }

    /// Append one inbound chunk and attempt a decode.
    pub fn push(&mut self, chunk: &[u8]) -> Assembled {
        self.buf.extend_from_slice(chunk);
        match parse_handshake(&self.buf, &self.secret) {
            ParseResult::Complete(handshake) => {
                let early_data = self.buf.split_off(handshake.header_len).freeze();
                Assembled::Ready {
                    handshake,
                    early_data,
                }
            }
            ParseResult::Incomplete(_) => {
                if self.buf.len() > self.max_header_bytes {
                    Assembled::Failed(ParseError::Truncated)
                } else {
                    Assembled::NeedMore
                }
            }
            ParseResult::Invalid(e) => Assembled::Failed(e),
        }
    }

    /// Signal end-of-input. A header still incomplete at EOF is a
    /// short read and fails closed.
    pub fn finish(&mut self) -> ParseError {
        match parse_handshake(&self.buf, &self.secret) {
            ParseResult::Invalid(e) => e,
            _ => ParseError::Truncated,
        }
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
