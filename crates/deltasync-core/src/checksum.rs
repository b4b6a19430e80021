//! Order-independent checksum over a set of key/value entries.
//!
//! Each entry contributes `crc32(len(key) || key || len(value) || value)`,
//! and contributions are combined with XOR. Because XOR is commutative,
//! associative and self-inverse, the checksum of a map depends only on its
//! live entries, never on the order in which edits were applied. Adding an
//! entry and removing it are the same operation.
//!
//! Length prefixes are fixed-width (8 bytes, big-endian), so no two distinct
//! `(key, value)` pairs feed the same byte sequence into the hash.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A 32-bit XOR-of-CRC32 fingerprint of a map's contents.
///
/// Rendered as 8 lowercase hex characters on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum(u32);

impl Checksum {
    /// The checksum of the empty set of entries.
    pub const EMPTY: Self = Self(0);

    /// Create a checksum for an empty map.
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Wrap a raw 32-bit value.
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// The raw 32-bit value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Fold an entry into the checksum.
    ///
    /// `value` must already be canonical JSON.
    pub fn add(&mut self, key: &str, value: &[u8]) {
        self.0 ^= fingerprint(key, value);
    }

    /// Remove an entry from the checksum. Identical to [`Checksum::add`].
    pub fn remove(&mut self, key: &str, value: &[u8]) {
        self.add(key, value);
    }

    /// Swap the value of an existing entry.
    pub fn replace(&mut self, key: &str, old: &[u8], new: &[u8]) {
        self.remove(key, old);
        self.add(key, new);
    }

    /// Render as 8 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        format!("{:08x}", self.0)
    }

    /// Parse from exactly 8 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::MalformedChecksum(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| CoreError::MalformedChecksum(s.to_string()))
    }
}

/// CRC32 over the length-framed entry.
fn fingerprint(key: &str, value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key.as_bytes());
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value);
    hasher.finalize()
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({:08x})", self.0)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
