//! # Address and Signature Formats
//!
//! Pure format checks for wallet addresses and recoverable signatures, plus
//! the canonical [`Address`] type every other component compares against.
//!
//! Wire formats:
//! - Address: `0x` + 40 hex digits, case-insensitive on input
//! - Signature: `0x` + 130 hex digits (r || s || v, 65 bytes)
//!
//! Internally an address is always the 20 raw bytes and always renders as
//! lowercase hex, so two addresses compare equal iff they name the same wallet.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// `true` iff `s` is `0x` followed by exactly `digits` hex digits.
fn is_prefixed_hex(s: &str, digits: usize) -> bool {
    match s.strip_prefix("0x") {
        Some(body) => body.len() == digits && body.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// `true` iff `s` is `0x` followed by exactly 40 hex digits (any case).
pub fn is_valid_address(s: &str) -> bool {
    is_prefixed_hex(s, ADDRESS_LEN * 2)
}

/// `true` iff `s` is a valid address already in canonical lowercase form.
pub fn is_canonical_address(s: &str) -> bool {
    is_valid_address(s) && !s[2..].bytes().any(|b| b.is_ascii_uppercase())
}

/// `true` iff `s` is `0x` followed by exactly 130 hex digits.
pub fn is_valid_signature(s: &str) -> bool {
    is_prefixed_hex(s, SIGNATURE_LEN * 2)
}

/// Error returned when a string is not a well-formed address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address format")]
pub struct InvalidAddress;

/// A 20-byte wallet address in canonical form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Parse a `0x`-prefixed address, accepting any letter case.
    pub fn parse(s: &str) -> Result<Self, InvalidAddress> {
        if !is_valid_address(s) {
            return Err(InvalidAddress);
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(&s[2..], &mut bytes).map_err(|_| InvalidAddress)?;
        Ok(Self(bytes))
    }

    /// Build an address from raw bytes (e.g. the tail of a public-key hash).
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Canonical lowercase `0x`-prefixed form.
    pub fn to_canonical(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A decoded 65-byte recoverable signature.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl RecoverableSignature {
    /// Decode `0x` + 130 hex digits. Returns `None` on any format error.
    pub fn parse(s: &str) -> Option<Self> {
        if !is_valid_signature(s) {
            return None;
        }
        let mut bytes = [0u8; SIGNATURE_LEN];
        hex::decode_to_slice(&s[2..], &mut bytes).ok()?;

        let mut r = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s_bytes.copy_from_slice(&bytes[32..64]);
        Some(Self {
            r,
            s: s_bytes,
            v: bytes[64],
        })
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoverableSignature")
            .field("v", &self.v)
            .finish_non_exhaustive()
    }
}
