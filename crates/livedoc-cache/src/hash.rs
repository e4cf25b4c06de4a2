//! Content hashing primitives
//!
//! [`ContentHash`] is the identity of a cached resource: an entry is only
//! served while its stored hash equals the hash of the live resource.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 digest of some content
///
/// Copy, ordered and hashable so it can be used directly as a map key or
/// manifest value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash a string's UTF-8 bytes
    #[inline]
    #[must_use]
    pub fn of_str(text: &str) -> Self {
        Self::compute(text.as_bytes())
    }

    /// Hash the JSON encoding of a value
    ///
    /// # Errors
    /// Returns error if the value cannot be serialized
    pub fn compute_serializable<T>(value: &T) -> Result<Self, HashError>
    where
        T: serde::Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        Ok(Self::compute(&json))
    }

    /// First 16 hex characters, for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

// Always hex on the wire: hashes travel inside JSON messages and CSV exports.
impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors produced while parsing or computing hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Decoded digest has the wrong length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Not a hex string
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Value could not be serialized for hashing
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_hash() {
        assert_eq!(ContentHash::compute(b"abc"), ContentHash::compute(b"abc"));
        assert_ne!(ContentHash::compute(b"abc"), ContentHash::compute(b"abd"));
    }

    #[test]
    fn display_parses_back() {
        let hash = ContentHash::of_str("export const a = 1;");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn parse_rejects_short_digest() {
        let err = "abcd".parse::<ContentHash>().unwrap_err();
        assert!(matches!(err, HashError::InvalidLength { expected: 32, actual: 2 }));
    }

    #[test]
    fn short_is_prefix() {
        let hash = ContentHash::of_str("x");
        assert_eq!(hash.short().len(), 16);
        assert!(hash.to_string().starts_with(&hash.short()));
    }

    #[test]
    fn serializes_as_hex_string() {
        let hash = ContentHash::of_str("x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn serializable_hash_tracks_value() {
        let a = ContentHash::compute_serializable(&vec![1, 2, 3]).unwrap();
        let b = ContentHash::compute_serializable(&vec![1, 2, 4]).unwrap();
        assert_ne!(a, b);
    }
}
