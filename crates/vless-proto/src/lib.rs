//! VLESS handshake parsing and early-data assembly.
//!
//! The parser is incremental: it never blocks and never consumes input.
//! Callers accumulate bytes (typically WebSocket frames) and re-run
//! `parse_handshake` until it returns something other than
//! `Incomplete`. `HeaderAssembler` wraps that loop and hands back any
//! payload bytes that arrived bundled with the header ("early data").

use std::fmt;

use bytes::BytesMut;

mod assemble;
mod secret;

pub use assemble::{Assembled, HeaderAssembler};
pub use secret::{InvalidSecret, Secret};

/// Both version bytes must be zero.
pub const VERSION: u8 = 0x00;
/// Server response handshake: the accepted version echoed back, sent
/// once before any relayed payload. Exactly two bytes, no trailing
/// addon-length byte.
pub const RESPONSE: [u8; 2] = [VERSION, VERSION];

/// Stream-connect command, the only one accepted.
pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x02;
pub const ATYP_IPV6: u8 = 0x03;

/// Maximum domain name length (one length byte on the wire).
pub const MAX_DOMAIN_LEN: usize = 255;

/// Minimum header bytes: version(2) + identifier(16) + addon_len(1)
/// + command(1) + port(2) + atyp(1) + ipv4(4).
pub const MIN_HEADER_BYTES: usize = 2 + Secret::LEN + 1 + 1 + 2 + 1 + 4;

/// Fatal handshake errors. Each one ends the session; nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    BadVersion,
    AuthFailed,
    /// Input ended (or the header cap was hit) before the header was complete.
    Truncated,
    UnsupportedCommand,
    UnknownAddressType,
    /// Domain name is empty, too long, or not valid UTF-8.
    InvalidDomain,
}

impl ParseError {
    /// Short human-readable string suitable for a close-frame reason.
    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::BadVersion => "invalid version",
            ParseError::AuthFailed => "identifier mismatch",
            ParseError::Truncated => "truncated header",
            ParseError::UnsupportedCommand => "unsupported command",
            ParseError::UnknownAddressType => "unknown address type",
            ParseError::InvalidDomain => "invalid domain",
        }
    }
}

/// Parse result for incremental parsing.
///
/// - `Complete(T)` - parsing succeeded.
/// - `Incomplete(n)` - buffer too small; `n` is the **minimum total
///   bytes** needed (not the additional bytes). Accumulate and retry.
/// - `Invalid(e)` - protocol violation, the session must be closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    Complete(T),
    Incomplete(usize),
    Invalid(ParseError),
}

/// Destination resolved from the handshake address block.
///
/// The host is already rendered as a dial-ready string: dotted decimal
/// for IPv4, the decoded name for domains, and eight zero-padded hex
/// groups for IPv6 (no `::` compression).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A decoded handshake header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub command: u8,
    pub destination: Destination,
    /// Total header bytes consumed; everything past this offset is
    /// early data to be replayed to the destination.
    pub header_len: usize,
}

/// Parse a VLESS handshake header from the front of `buf`.
///
/// Decoding is strictly sequential and fails closed: fields are
/// validated in wire order and no field is re-read. The identifier is
/// compared byte-for-byte against `secret`.
pub fn parse_handshake(buf: &[u8], secret: &Secret) -> ParseResult<Handshake> {
    if buf.len() < 2 {
        return ParseResult::Incomplete(2);
    }
    if buf[0] != VERSION || buf[1] != VERSION {
        return ParseResult::Invalid(ParseError::BadVersion);
    }
    let mut offset = 2;

    if buf.len() < offset + Secret::LEN {
        return ParseResult::Incomplete(offset + Secret::LEN);
    }
    if &buf[offset..offset + Secret::LEN] != secret.as_bytes() {
        return ParseResult::Invalid(ParseError::AuthFailed);
    }
    offset += Secret::LEN;

    if buf.len() < offset + 1 {
        return ParseResult::Incomplete(offset + 1);
    }
    let addon_len = buf[offset] as usize;
    offset += 1;

    // Addon bytes are reserved extension data: read and discarded.
    if buf.len() < offset + addon_len {
        return ParseResult::Incomplete(offset + addon_len);
    }
    offset += addon_len;

    if buf.len() < offset + 1 {
        return ParseResult::Incomplete(offset + 1);
    }
    let command = buf[offset];
    if command != CMD_CONNECT {
        return ParseResult::Invalid(ParseError::UnsupportedCommand);
    }
    offset += 1;

    if buf.len() < offset + 3 {
        return ParseResult::Incomplete(offset + 3);
    }
    let port = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    let atyp = buf[offset + 2];
    offset += 3;

    let (host, addr_len) = match parse_host(atyp, &buf[offset..]) {
        ParseResult::Complete(v) => v,
        ParseResult::Incomplete(n) => return ParseResult::Incomplete(offset + n),
        ParseResult::Invalid(e) => return ParseResult::Invalid(e),
    };
    offset += addr_len;

    ParseResult::Complete(Handshake {
        command,
        destination: Destination { host, port },
        header_len: offset,
    })
}

fn parse_host(atyp: u8, buf: &[u8]) -> ParseResult<(String, usize)> {
    match atyp {
        ATYP_IPV4 => {
            if buf.len() < 4 {
                return ParseResult::Incomplete(4);
            }
            let host = format!("{}.{}.{}.{}", buf[0], buf[1], buf[2], buf[3]);
            ParseResult::Complete((host, 4))
        }
        ATYP_DOMAIN => {
            if buf.is_empty() {
                return ParseResult::Incomplete(1);
            }
            let len = buf[0] as usize;
            if len == 0 {
                return ParseResult::Invalid(ParseError::InvalidDomain);
            }
            if buf.len() < 1 + len {
                return ParseResult::Incomplete(1 + len);
            }
            match std::str::from_utf8(&buf[1..1 + len]) {
                Ok(s) => ParseResult::Complete((s.to_owned(), 1 + len)),
                Err(_) => ParseResult::Invalid(ParseError::InvalidDomain),
            }
        }
        ATYP_IPV6 => {
            if buf.len() < 16 {
                return ParseResult::Incomplete(16);
            }
            // Eight lowercase 4-digit hex groups, no `::` compression.
            let mut host = String::with_capacity(39);
            for i in 0..8 {
                if i > 0 {
                    host.push(':');
                }
                let group = u16::from_be_bytes([buf[2 * i], buf[2 * i + 1]]);
                host.push_str(&format!("{group:04x}"));
            }
            ParseResult::Complete((host, 16))
        }
        _ => ParseResult::Invalid(ParseError::UnknownAddressType),
    }
}

/// Address forms accepted by `encode_handshake`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAddr<'a> {
    Ipv4([u8; 4]),
    Domain(&'a str),
    Ipv6([u8; 16]),
}

/// Errors from `encode_handshake`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    DomainTooLong,
    EmptyDomain,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::DomainTooLong => write!(f, "domain exceeds 255 bytes"),
            EncodeError::EmptyDomain => write!(f, "domain is empty"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Write a client handshake header to `buf`. Used by tests and client
/// tooling; the server only parses.
pub fn encode_handshake(
    buf: &mut BytesMut,
    secret: &Secret,
    addr: &HostAddr<'_>,
    port: u16,
) -> Result<(), EncodeError> {
    if let HostAddr::Domain(d) = addr {
        if d.is_empty() {
            return Err(EncodeError::EmptyDomain);
        }
        if d.len() > MAX_DOMAIN_LEN {
            return Err(EncodeError::DomainTooLong);
        }
    }
    buf.extend_from_slice(&[VERSION, VERSION]);
    buf.extend_from_slice(secret.as_bytes());
    buf.extend_from_slice(&[0x00, CMD_CONNECT]);
    buf.extend_from_slice(&port.to_be_bytes());
    match addr {
        HostAddr::Ipv4(ip) => {
            buf.extend_from_slice(&[ATYP_IPV4]);
            buf.extend_from_slice(ip);
        }
        HostAddr::Domain(d) => {
            buf.extend_from_slice(&[ATYP_DOMAIN, d.len() as u8]);
            buf.extend_from_slice(d.as_bytes());
        }
        HostAddr::Ipv6(ip) => {
            buf.extend_from_slice(&[ATYP_IPV6]);
            buf.extend_from_slice(ip);
        }
    }
    Ok(())
}
