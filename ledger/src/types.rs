//! # Identifier & Amount Types
//!
//! The value types every other module speaks in:
//!
//! - [`KeyId`]: a caller-chosen sub-account number.
//! - [`AssetId`]: a 32-byte opaque asset handle. Short ASCII labels such as
//!   `"ether"` map onto it by right-padding with zero bytes, the same layout
//!   a `bytes32` string literal has on an EVM chain.
//! - [`Address`]: a 20-byte caller identity (peers, initiators,
//!   beneficiaries).
//! - [`Amount`]: an unsigned 256-bit quantity. The ledger never performs
//!   unchecked arithmetic on it.
//!
//! Identifiers serialize as hex strings so they read well in JSON and can be
//! used as map keys.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{ADDRESS_LENGTH, ASSET_ID_LENGTH};

/// Asset quantities, in the asset's smallest unit.
pub type Amount = primitive_types::U256;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while parsing identifiers.
#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    /// The hex payload could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The decoded bytes have the wrong width.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Width the identifier requires.
        expected: usize,
        /// Width that was supplied.
        actual: usize,
    },

    /// A label was empty, too long, or contained a NUL byte.
    #[error("invalid asset label {0:?}: must be 1..=31 bytes without NUL")]
    InvalidLabel(String),
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits)?;
    if bytes.len() != N {
        return Err(IdError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

// ---------------------------------------------------------------------------
// KeyId
// ---------------------------------------------------------------------------

/// Identifier of a sub-account within the ledger.
///
/// Keys are opaque to the ledger: it never allocates them, it only
/// partitions balances by them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u64);

impl KeyId {
    /// Returns the raw key number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Opaque 32-byte identifier of an asset type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId([u8; ASSET_ID_LENGTH]);

impl AssetId {
    /// Wraps raw identifier bytes.
    pub const fn from_bytes(bytes: [u8; ASSET_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw identifier bytes.
    pub const fn as_bytes(&self) -> &[u8; ASSET_ID_LENGTH] {
        &self.0
    }

    /// Encodes a short label (e.g. `"ether"`) as an identifier.
    ///
    /// The label's bytes are copied to the front and the remainder is
    /// zero-filled. At least one trailing zero byte is kept so the label
    /// can always be recovered, hence the 31-byte limit.
    pub fn from_label(label: &str) -> Result<Self, IdError> {
        let raw = label.as_bytes();
        if raw.is_empty() || raw.len() >= ASSET_ID_LENGTH || raw.contains(&0) {
            return Err(IdError::InvalidLabel(label.to_string()));
        }
        let mut bytes = [0u8; ASSET_ID_LENGTH];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self(bytes))
    }

    /// Recovers the label if this identifier was produced by
    /// [`from_label`](Self::from_label).
    pub fn label(&self) -> Option<&str> {
        let end = self.0.iter().position(|b| *b == 0)?;
        if end == 0 || self.0[end..].iter().any(|b| *b != 0) {
            return None;
        }
        std::str::from_utf8(&self.0[..end]).ok()
    }

    /// Hex encoding without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-digit hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        decode_fixed::<ASSET_ID_LENGTH>(s).map(Self)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "AssetId({label:?})"),
            None => write!(f, "AssetId({}...)", &self.to_hex()[..12]),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => write!(f, "0x{}", self.to_hex()),
        }
    }
}

/// Accepts either a hex identifier (64 digits, optional `0x`) or a label.
impl FromStr for AssetId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() == ASSET_ID_LENGTH * 2 && digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            Self::from_hex(digits)
        } else {
            Self::from_label(s)
        }
    }
}

impl From<[u8; ASSET_ID_LENGTH]> for AssetId {
    fn from(bytes: [u8; ASSET_ID_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte caller identity.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Self = Self([0u8; ADDRESS_LENGTH]);

    /// Wraps raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// An address with every byte set to `byte`. Handy for fixtures.
    pub const fn repeat_byte(byte: u8) -> Self {
        Self([byte; ADDRESS_LENGTH])
    }

    /// Returns the raw address bytes.
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns true for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Hex encoding with a `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a 40-digit hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        decode_fixed::<ADDRESS_LENGTH>(s).map(Self)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
