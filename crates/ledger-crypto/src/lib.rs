//! # ledger-crypto
//!
//! Hashing used by the blockchain engine: block hashes, Merkle nodes, and
//! the Proof-of-Work search all bottom out in SHA-256. The ledger does not
//! authenticate transactions cryptographically (no signing, no keys) per
//! the spec's explicit non-goal, so this crate exposes hashing only.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::{sha256, sha256_hex};
