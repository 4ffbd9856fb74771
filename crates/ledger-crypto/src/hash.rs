//! SHA-256 hashing.

use ledger_primitives::Hash256;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Hash256::from_bytes(bytes)
}

/// Compute the SHA-256 digest of `data` and render it as lowercase hex
/// with no `0x` prefix, matching the wire format used throughout the
/// blockchain engine (`SHA256_hex` in the spec).
pub fn sha256_hex(data: &[u8]) -> String {
    sha256(data).to_hex()
}
