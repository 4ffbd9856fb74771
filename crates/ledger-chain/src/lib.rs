//! # ledger-chain
//!
//! The blockchain engine: the pending-transaction pool, Merkle root
//! computation, block sealing (Raft and Proof-of-Work variants), and chain
//! validation (`setBlocks`). This crate is deliberately store-agnostic —
//! it operates on explicit "last block" parameters and returns fully-formed
//! `Block`s, leaving persistence to `ledger-store` and orchestration to
//! `ledger-node`.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod block_ops;
mod error;
mod merkle;
mod pool;

pub use block_ops::{
    commit_block, commit_proof_of_work, compute_block_hash, generate_genesis_block,
    get_proof_of_work, proof_of_work_nonce, validate_chain, LastBlock, PowCandidate,
};
pub use error::{ChainError, ChainResult};
pub use merkle::merkle_root;
pub use pool::TransactionPool;
