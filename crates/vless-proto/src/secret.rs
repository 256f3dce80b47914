//! The shared secret identifying authorized clients.

use std::fmt;

/// A 16-byte identifier, canonically written as a 36-character
/// hyphenated lowercase hex string (`8-4-4-4-12`). Loaded once at
/// startup and compared byte-for-byte against the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Secret([u8; Secret::LEN]);

/// Error for a secret string that is not in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSecret;

impl fmt::Display for InvalidSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret must be a 36-character hyphenated hex string")
    }
}

impl std::error::Error for InvalidSecret {}

impl Secret {
    pub const LEN: usize = 16;

    /// Canonical string length including the four hyphens.
    pub const CANONICAL_LEN: usize = 36;

    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Parse the canonical hyphenated form. Hex digits may be either
    /// case; hyphens must sit at positions 8, 13, 18 and 23.
    pub fn parse(s: &str) -> Result<Self, InvalidSecret> {
        let raw = s.as_bytes();
        if raw.len() != Self::CANONICAL_LEN {
            return Err(InvalidSecret);
        }
        let mut bytes = [0u8; Self::LEN];
        let mut out = 0;
        let mut i = 0;
        while i < raw.len() {
            if matches!(i, 8 | 13 | 18 | 23) {
                if raw[i] != b'-' {
                    return Err(InvalidSecret);
                }
                i += 1;
                continue;
            }
            let hi = hex_val(raw[i]).ok_or(InvalidSecret)?;
            let lo = hex_val(raw[i + 1]).ok_or(InvalidSecret)?;
            bytes[out] = (hi << 4) | lo;
            out += 1;
            i += 2;
        }
        Ok(Self(bytes))
    }
}

impl std::str::FromStr for Secret {
    type Err = InvalidSecret;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Secret::parse(s)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_canonical_roundtrip() {
        let s = "dba99842-a33e-4bd3-a183-26e4a690be03";
        let secret = Secret::parse(s).unwrap();
        assert_eq!(secret.to_string(), s);
        assert_eq!(secret.as_bytes()[0], 0xdb);
        assert_eq!(secret.as_bytes()[15], 0x03);
    }

    #[test]
    fn parse_accepts_uppercase() {
        let secret = Secret::parse("DBA99842-A33E-4BD3-A183-26E4A690BE03").unwrap();
        assert_eq!(secret.to_string(), "dba99842-a33e-4bd3-a183-26e4a690be03");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Secret::parse("").is_err());
        assert!(Secret::parse("dba99842a33e4bd3a18326e4a690be03").is_err());
        assert!(Secret::parse("dba99842-a33e-4bd3-a183-26e4a690be0g").is_err());
        assert!(Secret::parse("dba99842+a33e-4bd3-a183-26e4a690be03").is_err());
        assert!(Secret::parse("dba99842-a33e-4bd3-a183-26e4a690be031").is_err());
    }

    #[test]
    fn byte_comparison() {
        let a = Secret::parse("dba99842-a33e-4bd3-a183-26e4a690be03").unwrap();
        let b = Secret::from_bytes(*a.as_bytes());
        assert_eq!(a, b);
    }
}
