//! 256-bit hash digest type.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing or constructing a [`Hash256`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    /// The input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The input decoded to the wrong number of bytes.
    #[error("invalid length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 32-byte digest, rendered as lowercase hex with no `0x` prefix.
///
/// The ledger's wire format and the genesis constant `H0` both use bare
/// hex strings, unlike the `0x`-prefixed convention of EVM-style chains.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Construct from a raw 32-byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    /// Construct from a slice, failing if the length is not exactly 32.
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        if slice.len() != 32 {
            return Err(HashError::InvalidLength(slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Hash256(bytes))
    }

    /// Parse from a hex string without a `0x` prefix (one is stripped if present).
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Render as lowercase hex with no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Whether the hex rendering begins with the given ASCII prefix.
    ///
    /// Used to check the Proof-of-Work difficulty prefix (`"0000"`).
    pub fn has_hex_prefix(&self, prefix: &str) -> bool {
        self.to_hex().starts_with(prefix)
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Hash256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Hash256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_roundtrip() {
        let bytes = [0x42u8; 32];
        let h = Hash256::from_bytes(bytes);
        assert_eq!(h.as_bytes(), &bytes);
    }

    #[test]
    fn test_hex_roundtrip_no_prefix() {
        let h = Hash256::from_bytes([0xabu8; 32]);
        let hex = h.to_hex();
        assert!(!hex.starts_with("0x"));
        assert_eq!(hex.len(), 64);
        assert_eq!(Hash256::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn test_from_hex_tolerates_0x_prefix() {
        let h = Hash256::from_hex("0x0000000000000000000000000000000000000000000000000000000000000001").unwrap();
        assert_eq!(h.as_bytes()[31], 1);
    }

    #[test]
    fn test_from_hex_invalid() {
        assert!(matches!(Hash256::from_hex("not hex"), Err(HashError::InvalidHex(_))));
    }

    #[test]
    fn test_from_slice_wrong_length() {
        assert_eq!(Hash256::from_slice(&[0u8; 10]), Err(HashError::InvalidLength(10)));
    }

    #[test]
    fn test_has_hex_prefix() {
        let h = Hash256::from_hex("0000abc0000000000000000000000000000000000000000000000000000000").unwrap();
        assert!(h.has_hex_prefix("0000"));
        assert!(!h.has_hex_prefix("ffff"));
    }

    #[test]
    fn test_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert_eq!(Hash256::ZERO.to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_ordering() {
        let a = Hash256::from_bytes([1u8; 32]);
        let b = Hash256::from_bytes([2u8; 32]);
        assert!(a < b);
    }
}
