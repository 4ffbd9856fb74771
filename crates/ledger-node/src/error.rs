//! Node orchestrator error types.

use thiserror::Error;

/// Errors from the node orchestrator.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The block store rejected an operation.
    #[error(transparent)]
    Store(#[from] ledger_store::StoreError),

    /// The blockchain engine rejected an operation.
    #[error(transparent)]
    Chain(#[from] ledger_chain::ChainError),

    /// The consensus engine rejected a message.
    #[error(transparent)]
    Consensus(#[from] ledger_consensus::ConsensusError),

    /// The network service rejected an operation.
    #[error(transparent)]
    Network(#[from] ledger_network::NetworkError),

    /// A wire payload did not decode into the shape a command expects.
    #[error(transparent)]
    Types(#[from] ledger_types::TypesError),

    /// Configuration was missing or self-contradictory. Fatal at startup
    /// (spec §7 error kind 6); never raised mid-run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Underlying file or socket I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A command's `data` payload did not parse as JSON into the expected shape.
    #[error("malformed command payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for node orchestrator operations.
pub type NodeResult<T> = Result<T, NodeError>;
