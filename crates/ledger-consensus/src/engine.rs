//! The Raft-like state machine (spec §4.1): leader election, heartbeat,
//! and provisional-block replication. Pure and store-agnostic: it returns
//! [`ConsensusAction`]s (messages to send, batches ready to commit) for the
//! node orchestrator to execute against the network and the blockchain
//! engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use rand::Rng;
use serde_json::Value;

use ledger_primitives::NodeId;
use ledger_types::{Envelope, Transaction};

use crate::state::{ProvisionalEntry, RaftState};
use crate::types::{
    AppendEntry, AppendMessage, AppendedEntry, AppendedMessage, CommittedEntry, EntryType, NewEntry,
    ProvisionalPayload, VoteRequest, VotedReply,
};

/// Timing configuration (spec §6 `keepaliveInterval`/`electionMinInterval`/
/// `electionMaxInterval`/`consensusInterval`).
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Leader heartbeat cadence.
    pub keepalive_interval_ms: u64,
    /// Lower bound of the randomized election timeout.
    pub election_min_interval_ms: u64,
    /// Upper bound (exclusive) of the randomized election timeout.
    pub election_max_interval_ms: u64,
    /// Cadence of the leader's provisional-block commit sweep.
    pub consensus_interval_ms: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        RaftConfig {
            keepalive_interval_ms: 1000,
            election_min_interval_ms: 2000,
            election_max_interval_ms: 4000,
            consensus_interval_ms: 200,
        }
    }
}

/// Where an outbound message should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    /// Every peer in the cluster.
    Broadcast,
    /// A single named node.
    Node(NodeId),
}

/// A provisional batch the leader or a follower has determined is safe to
/// drain into a sealed block.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitBatch {
    /// Sequences being committed, for diagnostics/logging.
    pub sequences: Vec<u64>,
    /// Entries in commit order, ready to replay into the blockchain engine.
    pub entries: Vec<(EntryType, ProvisionalPayload)>,
}

/// A side effect the engine wants the orchestrator to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusAction {
    /// Send an envelope to one or all peers.
    Send(SendTarget, Envelope),
    /// Drain a committed batch into the blockchain engine and seal a block.
    Commit(CommitBatch),
}

fn command_envelope(name: &str, msg: impl serde::Serialize) -> Envelope {
    Envelope::command(name, serde_json::to_value(msg).expect("consensus messages always serialize"))
}

fn push_envelope(name: &str, msg: impl serde::Serialize) -> Envelope {
    Envelope::push(name, serde_json::to_value(msg).expect("consensus messages always serialize"))
}

/// The per-node Raft-like state machine.
pub struct RaftEngine {
    self_id: NodeId,
    peers: Vec<NodeId>,
    config: RaftConfig,

    state: RaftState,
    term: u64,
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,
    votes: HashSet<NodeId>,

    provisional_sequence: u64,
    lost_provisional_sequences: BTreeSet<u64>,
    provisional_blocks: BTreeMap<u64, ProvisionalEntry>,

    transaction_backlog: Vec<Transaction>,
    temporary_transaction_backlog: Vec<Transaction>,
    committed_transaction_backlog: Vec<String>,
}

impl RaftEngine {
    /// A fresh `Follower` with empty state, as on node start.
    pub fn new(self_id: NodeId, peers: Vec<NodeId>, config: RaftConfig) -> Self {
        RaftEngine {
            self_id,
            peers,
            config,
            state: RaftState::Follower,
            term: 0,
            voted_for: None,
            leader_id: None,
            votes: HashSet::new(),
            provisional_sequence: 0,
            lost_provisional_sequences: BTreeSet::new(),
            provisional_blocks: BTreeMap::new(),
            transaction_backlog: Vec::new(),
            temporary_transaction_backlog: Vec::new(),
            committed_transaction_backlog: Vec::new(),
        }
    }

    /// `floor(N/2)+1` where `N` is cluster size including self.
    pub fn quorum(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    /// Current role.
    pub fn state(&self) -> RaftState {
        self.state
    }

    /// Current term.
    pub fn term(&self) -> u64 {
        self.term
    }

    /// Believed current leader, if any.
    pub fn leader_id(&self) -> Option<&NodeId> {
        self.leader_id.as_ref()
    }

    /// Outstanding (unacknowledged or unswept) provisional entries.
    pub fn provisional_block_count(&self) -> usize {
        self.provisional_blocks.len()
    }

    /// How long until the single election/heartbeat timer should fire next.
    pub fn next_timer_delay(&self) -> Duration {
        match self.state {
            RaftState::Leader => Duration::from_millis(self.config.keepalive_interval_ms),
            _ => {
                let mut rng = rand::thread_rng();
                let ms = rng.gen_range(self.config.election_min_interval_ms..self.config.election_max_interval_ms);
                Duration::from_millis(ms)
            }
        }
    }

    /// The election/heartbeat timer firing (spec §4.1 Timing).
    pub fn on_timer(&mut self) -> Vec<ConsensusAction> {
        match self.state {
            RaftState::Leader => {
                let msg = AppendMessage {
                    id: self.self_id.clone(),
                    term: self.term,
                    sequence: Some(self.provisional_sequence),
                    entry: None,
                };
                vec![ConsensusAction::Send(SendTarget::Broadcast, command_envelope("append", msg))]
            }
            RaftState::Follower | RaftState::Candidate => {
                self.term += 1;
                self.state = RaftState::Candidate;
                self.voted_for = Some(self.self_id.clone());
                self.votes.clear();
                self.votes.insert(self.self_id.clone());
                self.leader_id = None;
                let req = VoteRequest {
                    id: self.self_id.clone(),
                    term: self.term,
                };
                vec![ConsensusAction::Send(SendTarget::Broadcast, command_envelope("vote", req))]
            }
        }
    }

    /// The leader's provisional-block commit sweep (spec §4.1
    /// "watchProvisionalBlocks"), driven by a separate `consensusInterval`
    /// timer. No-op outside `Leader` state.
    pub fn on_consensus_tick(&mut self) -> Vec<ConsensusAction> {
        if self.state != RaftState::Leader {
            return vec![];
        }

        let quorum = self.quorum();
        let mut completed = Vec::new();
        let mut unprocessed = Vec::new();
        for (sequence, entry) in &self.provisional_blocks {
            if entry.consensus as usize >= quorum {
                completed.push(*sequence);
            } else if entry.owner != self.self_id {
                unprocessed.push(*sequence);
            }
        }

        let mut actions = Vec::new();

        if !completed.is_empty() {
            let mut entries = Vec::with_capacity(completed.len());
            for sequence in &completed {
                if let Some(entry) = self.provisional_blocks.remove(sequence) {
                    entries.push((entry.entry_type, entry.payload));
                }
            }
            let msg = AppendMessage {
                id: self.self_id.clone(),
                term: self.term,
                sequence: None,
                entry: Some(AppendEntry::Committed(CommittedEntry {
                    sequences: completed.clone(),
                })),
            };
            actions.push(ConsensusAction::Send(SendTarget::Broadcast, command_envelope("append", msg)));
            actions.push(ConsensusAction::Commit(CommitBatch {
                sequences: completed,
                entries,
            }));
        }

        for sequence in unprocessed {
            if let Some(entry) = self.provisional_blocks.get_mut(&sequence) {
                entry.consensus = 0;
                entry.owner = self.self_id.clone();
                let new_entry = NewEntry {
                    sequence,
                    transaction: entry.payload.to_value(),
                    entry_type: entry.entry_type,
                };
                let msg = AppendMessage {
                    id: self.self_id.clone(),
                    term: self.term,
                    sequence: None,
                    entry: Some(AppendEntry::New(new_entry)),
                };
                actions.push(ConsensusAction::Send(SendTarget::Broadcast, command_envelope("append", msg)));
            }
        }

        actions
    }

    /// A client command (`addTransaction` / `addTemporaryTransaction` /
    /// `commitTransaction`) arriving locally.
    pub fn submit(&mut self, payload: ProvisionalPayload, entry_type: EntryType) -> Vec<ConsensusAction> {
        if self.state == RaftState::Leader {
            self.provisional_sequence += 1;
            let sequence = self.provisional_sequence;
            let entry = NewEntry {
                sequence,
                transaction: payload.to_value(),
                entry_type,
            };
            self.provisional_blocks.insert(
                sequence,
                ProvisionalEntry {
                    sequence,
                    payload,
                    entry_type,
                    consensus: 0,
                    owner: self.self_id.clone(),
                },
            );
            let msg = AppendMessage {
                id: self.self_id.clone(),
                term: self.term,
                sequence: None,
                entry: Some(AppendEntry::New(entry)),
            };
            return vec![ConsensusAction::Send(SendTarget::Broadcast, command_envelope("append", msg))];
        }

        match (entry_type, payload) {
            (EntryType::Normal, ProvisionalPayload::Transactions(ts)) => self.transaction_backlog.extend(ts),
            (EntryType::Temporary, ProvisionalPayload::Transactions(ts)) => {
                self.temporary_transaction_backlog.extend(ts)
            }
            (EntryType::Commit, ProvisionalPayload::TransactionIds(ids)) => {
                self.committed_transaction_backlog.extend(ids)
            }
            _ => {}
        }
        self.retry_backlog()
    }

    /// Forward any backlogged client commands to the known leader. Called
    /// on submission and on a fixed `electionMaxInterval` retry cadence
    /// while `leaderId` is unknown (spec §4.1 "Client forwarding").
    pub fn retry_backlog(&mut self) -> Vec<ConsensusAction> {
        let Some(leader) = self.leader_id.clone() else {
            return vec![];
        };
        let mut actions = Vec::new();
        for t in std::mem::take(&mut self.transaction_backlog) {
            actions.push(ConsensusAction::Send(
                SendTarget::Node(leader.clone()),
                command_envelope("addTransaction", t.to_value()),
            ));
        }
        for t in std::mem::take(&mut self.temporary_transaction_backlog) {
            actions.push(ConsensusAction::Send(
                SendTarget::Node(leader.clone()),
                command_envelope("addTemporaryTransaction", t.to_value()),
            ));
        }
        for id in std::mem::take(&mut self.committed_transaction_backlog) {
            actions.push(ConsensusAction::Send(
                SendTarget::Node(leader.clone()),
                command_envelope("commitTransaction", Value::String(id)),
            ));
        }
        actions
    }

    /// Re-queue a transaction whose forward to the leader failed to send.
    pub fn requeue_transaction(&mut self, t: Transaction) {
        self.transaction_backlog.insert(0, t);
    }

    /// Re-queue a temporary transaction whose forward failed to send.
    pub fn requeue_temporary_transaction(&mut self, t: Transaction) {
        self.temporary_transaction_backlog.insert(0, t);
    }

    /// Re-queue a commit id whose forward failed to send.
    pub fn requeue_committed_transaction(&mut self, id: String) {
        self.committed_transaction_backlog.insert(0, id);
    }

    /// `{command: "vote", data: {id, term}}` arriving from a candidate.
    pub fn handle_vote(&mut self, request: VoteRequest) -> Vec<ConsensusAction> {
        if request.term < self.term {
            return vec![];
        }
        if request.term > self.term {
            self.term = request.term;
            self.voted_for = None;
        }

        let granted = match &self.voted_for {
            None => true,
            Some(v) => *v == request.id,
        };
        if granted {
            self.voted_for = Some(request.id.clone());
            self.state = RaftState::Follower;
        }

        let reply = VotedReply {
            granted,
            from: self.self_id.clone(),
            term: self.term,
        };
        vec![ConsensusAction::Send(SendTarget::Node(request.id), push_envelope("voted", reply))]
    }

    /// `{dataName: "voted", data: {granted, from, term}}` arriving from a
    /// peer we solicited a vote from.
    pub fn handle_voted(&mut self, reply: VotedReply) -> Vec<ConsensusAction> {
        if !reply.granted || self.state != RaftState::Candidate || reply.term != self.term {
            return vec![];
        }
        self.votes.insert(reply.from);
        if self.votes.len() < self.quorum() {
            return vec![];
        }

        self.state = RaftState::Leader;
        self.leader_id = Some(self.self_id.clone());
        let msg = AppendMessage {
            id: self.self_id.clone(),
            term: self.term,
            sequence: Some(self.provisional_sequence),
            entry: None,
        };
        vec![ConsensusAction::Send(SendTarget::Broadcast, command_envelope("append", msg))]
    }

    /// `{command: "append", ...}` arriving from the leader (or a node
    /// claiming to be leader).
    pub fn handle_append(&mut self, msg: AppendMessage) -> Vec<ConsensusAction> {
        if msg.term < self.term {
            return vec![];
        }
        if msg.term > self.term {
            self.term = msg.term;
            self.voted_for = None;
        }
        if self.state != RaftState::Leader {
            self.state = RaftState::Follower;
        }
        self.leader_id = Some(msg.id.clone());

        match msg.entry {
            None => vec![],
            Some(AppendEntry::New(entry)) => self.handle_new_entry(msg.id, msg.term, entry),
            Some(AppendEntry::Committed(batch)) => self.handle_committed_batch(batch),
        }
    }

    fn handle_new_entry(&mut self, leader: NodeId, term: u64, entry: NewEntry) -> Vec<ConsensusAction> {
        let NewEntry {
            sequence,
            transaction,
            entry_type,
        } = entry;

        let already_applied = sequence <= self.provisional_sequence && !self.lost_provisional_sequences.contains(&sequence);
        if already_applied {
            return vec![self.appended_reply(leader, term, sequence)];
        }

        if sequence > self.provisional_sequence {
            for missing in (self.provisional_sequence + 1)..sequence {
                self.lost_provisional_sequences.insert(missing);
            }
            self.provisional_sequence = sequence;
        }
        self.lost_provisional_sequences.remove(&sequence);

        let payload = match ProvisionalPayload::from_value(entry_type, &transaction) {
            Ok(p) => p,
            Err(_) => return vec![],
        };
        self.provisional_blocks.insert(
            sequence,
            ProvisionalEntry {
                sequence,
                payload,
                entry_type,
                consensus: 1,
                owner: leader.clone(),
            },
        );
        vec![self.appended_reply(leader, term, sequence)]
    }

    fn appended_reply(&self, leader: NodeId, term: u64, sequence: u64) -> ConsensusAction {
        let msg = AppendedMessage {
            from: self.self_id.clone(),
            term,
            entry: AppendedEntry { sequence },
        };
        ConsensusAction::Send(SendTarget::Node(leader), push_envelope("appended", msg))
    }

    fn handle_committed_batch(&mut self, batch: CommittedEntry) -> Vec<ConsensusAction> {
        let all_present = batch.sequences.iter().all(|s| self.provisional_blocks.contains_key(s));
        if !all_present {
            return vec![];
        }
        let mut entries = Vec::with_capacity(batch.sequences.len());
        for sequence in &batch.sequences {
            if let Some(entry) = self.provisional_blocks.remove(sequence) {
                entries.push((entry.entry_type, entry.payload));
            }
        }
        vec![ConsensusAction::Commit(CommitBatch {
            sequences: batch.sequences,
            entries,
        })]
    }

    /// `{dataName: "appended", ...}` arriving from a follower (leader-side
    /// acknowledgment counting).
    pub fn handle_appended(&mut self, msg: AppendedMessage) -> Vec<ConsensusAction> {
        if self.state != RaftState::Leader || msg.term != self.term {
            return vec![];
        }
        if let Some(entry) = self.provisional_blocks.get_mut(&msg.entry.sequence) {
            if entry.owner == self.self_id {
                entry.consensus += 1;
            }
        }
        vec![]
    }
}
