//! Per-node consensus state: the Raft role and the provisional-block map.

use ledger_primitives::NodeId;

use crate::types::{EntryType, ProvisionalPayload};

/// The three Raft-like roles a node can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftState {
    /// Default role; forwards client commands to the leader.
    Follower,
    /// Mid-election, soliciting votes.
    Candidate,
    /// Replicates client commands and drives block sealing.
    Leader,
}

/// `provisionalBlocks[sequence]` (spec §3): a pending client command
/// awaiting quorum acknowledgment before it is drained into a block.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionalEntry {
    /// Monotonic sequence assigned by the leader.
    pub sequence: u64,
    /// The pending payload.
    pub payload: ProvisionalPayload,
    /// Which client command this entry replays on commit.
    pub entry_type: EntryType,
    /// Acknowledgment count (the owner's own copy counts as 1).
    pub consensus: u32,
    /// Node that first recorded this entry.
    pub owner: NodeId,
}
