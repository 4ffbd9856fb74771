//! Blockchain engine error types.

use thiserror::Error;

/// Errors from the blockchain engine.
#[derive(Debug, Error)]
pub enum ChainError {
    /// A sealing operation was attempted with an empty pool.
    #[error("transaction pool is empty")]
    EmptyPool,

    /// `commitTransaction` referenced a transaction id not present (or not
    /// temporary) in the pool.
    #[error("no temporary transaction with id {0}")]
    UnknownTemporaryTransaction(String),

    /// The supplied Merkle root did not match the pool's current root.
    #[error("root hash mismatch: expected {expected}, got {got}")]
    RootHashMismatch {
        /// Root hash recomputed from the current pool.
        expected: String,
        /// Root hash supplied by the caller.
        got: String,
    },

    /// A Proof-of-Work commit's hash did not meet the difficulty prefix.
    #[error("proof of work hash {0} does not meet difficulty prefix")]
    DifficultyNotMet(String),

    /// `setBlocks` was given a sequence that fails validation; no blocks
    /// were written.
    #[error("chain validation failed at index {index}: {reason}")]
    InvalidChain {
        /// Index of the first invalid block.
        index: u64,
        /// Human-readable validation failure.
        reason: String,
    },
}

/// Result type for blockchain engine operations.
pub type ChainResult<T> = Result<T, ChainError>;
