//! # ledger-consensus
//!
//! Raft-like leader election and provisional-block replication for the
//! ledger node.
//!
//! This crate provides:
//! - Leader election with randomized timeouts
//! - Provisional-block replication and quorum-gated commit sweeps
//! - Client-command backlog and forwarding while the leader is unknown

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod state;
pub mod types;

pub use engine::{CommitBatch, ConsensusAction, RaftConfig, RaftEngine, SendTarget};
pub use error::{ConsensusError, ConsensusResult};
pub use state::{ProvisionalEntry, RaftState};
pub use types::{
    AppendEntry, AppendMessage, AppendedEntry, AppendedMessage, CommittedEntry, EntryType, NewEntry,
    ProvisionalPayload, VoteRequest, VotedReply,
};
