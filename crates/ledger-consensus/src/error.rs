//! Consensus engine error types.

use thiserror::Error;

/// Errors from the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A provisional entry's `transaction`/`entry` payload did not decode
    /// into the shape its `type` implies.
    #[error("malformed provisional payload: {0}")]
    MalformedPayload(String),

    /// Referenced a provisional sequence this node has no record of.
    #[error("unknown provisional sequence {0}")]
    UnknownSequence(u64),
}

/// Result type for consensus engine operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
