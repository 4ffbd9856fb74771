//! An in-process Raft cluster harness for the end-to-end seed scenarios.
//!
//! Message delivery is short-circuited through a plain work queue instead of
//! real sockets: each [`ConsensusAction::Send`] is resolved by calling the
//! target node's engine directly, recursively draining whatever actions that
//! produces. This keeps the scenarios deterministic and fast while still
//! exercising the real `RaftEngine`/`BlockStore`/`TransactionPool` code.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use ledger_chain::{commit_block, generate_genesis_block, LastBlock, TransactionPool};
use ledger_consensus::{
    CommitBatch, ConsensusAction, EntryType, ProvisionalPayload, RaftConfig, RaftEngine, RaftState, SendTarget,
};
use ledger_primitives::NodeId;
use ledger_store::BlockStore;
use ledger_types::Transaction;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

/// A fresh scratch directory under `/tmp`, unique per call (teacher's
/// `temp_db_path` pattern: monotonic counter plus wall-clock nanoseconds).
pub fn temp_path(label: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock").as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    PathBuf::from(format!("/tmp/ledger_e2e_{label}_{nanos}_{n}"))
}

/// Remove a scratch directory created by [`temp_path`]. Called explicitly at
/// the end of each test rather than relying on `Drop`.
pub fn cleanup(path: &PathBuf) {
    let _ = std::fs::remove_dir_all(path);
}

const BLOCK_VERSION: &str = "1.0";

struct SimNode {
    id: NodeId,
    engine: RaftEngine,
    store: BlockStore,
    pool: TransactionPool,
    path: PathBuf,
}

/// A simulated multi-node Raft cluster: every node gets its own `RaftEngine`
/// and RocksDB-backed `BlockStore`; no sockets, no tokio runtime.
pub struct Cluster {
    nodes: Vec<SimNode>,
}

impl Cluster {
    /// Build a cluster of `n` nodes, each with a fresh block store indexed
    /// on the attribute names the seed scenarios query by.
    pub fn new(n: usize) -> Self {
        let index_keys = vec![
            "articleCode".to_string(),
            "recipientCompanyId".to_string(),
            "inspectionCompanyId".to_string(),
            "cocCertificateCode".to_string(),
        ];
        let ids: Vec<NodeId> = (0..n).map(|i| NodeId::new(format!("n{i}"))).collect();
        let nodes = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let peers: Vec<NodeId> = ids.iter().filter(|p| *p != id).cloned().collect();
                let path = temp_path(&format!("node{i}"));
                let store = BlockStore::open(&path, index_keys.clone()).expect("open block store");
                SimNode {
                    id: id.clone(),
                    engine: RaftEngine::new(id.clone(), peers, RaftConfig::default()),
                    store,
                    pool: TransactionPool::new(),
                    path,
                }
            })
            .collect();
        Cluster { nodes }
    }

    fn index_of(&self, id: &NodeId) -> usize {
        self.nodes.iter().position(|n| &n.id == id).expect("unknown node id")
    }

    /// `generateGenesisBlock` (spec §6), applied to every node directly —
    /// genesis is a local, not a consensus, operation.
    pub fn generate_genesis(&mut self) {
        for node in &mut self.nodes {
            if node.store.latest().expect("read tip").is_none() {
                let block = generate_genesis_block(BLOCK_VERSION, 0, 0);
                node.store.put_block(&block).expect("seal genesis");
            }
        }
    }

    /// Drive the election timer on every node until one becomes `Leader`,
    /// or panic if none does within a generous bound.
    pub fn elect_leader(&mut self) {
        for _ in 0..200 {
            for i in 0..self.nodes.len() {
                let actions = self.nodes[i].engine.on_timer();
                self.run(i, actions);
            }
            if self.nodes.iter().any(|n| n.engine.state() == RaftState::Leader) {
                return;
            }
        }
        panic!("no leader elected within bound");
    }

    /// `addTransaction` against node `from`, then settle the cluster until
    /// every node's chain tip reaches `target_index` (or the bound expires).
    pub fn submit_and_settle(&mut self, from: usize, transactions: Vec<Transaction>, target_index: u64) {
        let actions = self.nodes[from]
            .engine
            .submit(ProvisionalPayload::Transactions(transactions), EntryType::Normal);
        self.run(from, actions);
        self.settle(target_index);
    }

    /// `commitTransaction` against node `from`, then settle until
    /// `target_index` is reached on every node.
    pub fn commit_and_settle(&mut self, from: usize, ids: Vec<String>, target_index: u64) {
        let actions = self.nodes[from]
            .engine
            .submit(ProvisionalPayload::TransactionIds(ids), EntryType::Commit);
        self.run(from, actions);
        self.settle(target_index);
    }

    fn settle(&mut self, target_index: u64) {
        for _ in 0..200 {
            let reached = self.nodes.iter().all(|n| {
                n.store.latest().expect("read tip").map(|l| l.index).unwrap_or(0) >= target_index
            });
            if reached {
                return;
            }
            for i in 0..self.nodes.len() {
                let actions = self.nodes[i].engine.on_consensus_tick();
                self.run(i, actions);
            }
        }
        panic!("cluster did not settle to block index {target_index} within bound");
    }

    /// Drain every action (and every action it transitively produces)
    /// originating at node `from_idx`.
    fn run(&mut self, from_idx: usize, actions: Vec<ConsensusAction>) {
        let mut queue: VecDeque<(usize, ConsensusAction)> = actions.into_iter().map(|a| (from_idx, a)).collect();
        while let Some((from_idx, action)) = queue.pop_front() {
            match action {
                ConsensusAction::Send(target, envelope) => {
                    let targets: Vec<usize> = match target {
                        SendTarget::Broadcast => (0..self.nodes.len()).filter(|&i| i != from_idx).collect(),
                        SendTarget::Node(id) => vec![self.index_of(&id)],
                    };
                    for to_idx in targets {
                        let produced = self.deliver(to_idx, envelope.name(), envelope.data());
                        queue.extend(produced.into_iter().map(|a| (to_idx, a)));
                    }
                }
                ConsensusAction::Commit(batch) => self.seal(from_idx, batch),
            }
        }
    }

    fn deliver(&mut self, to_idx: usize, name: &str, data: &serde_json::Value) -> Vec<ConsensusAction> {
        let engine = &mut self.nodes[to_idx].engine;
        match name {
            "vote" => serde_json::from_value(data.clone()).map(|req| engine.handle_vote(req)).unwrap_or_default(),
            "voted" => serde_json::from_value(data.clone()).map(|r| engine.handle_voted(r)).unwrap_or_default(),
            "append" => serde_json::from_value(data.clone()).map(|m| engine.handle_append(m)).unwrap_or_default(),
            "appended" => serde_json::from_value(data.clone()).map(|m| engine.handle_appended(m)).unwrap_or_default(),
            "addTransaction" => Transaction::from_value(data.clone())
                .map(|t| engine.submit(ProvisionalPayload::Transactions(vec![t]), EntryType::Normal))
                .unwrap_or_default(),
            "addTemporaryTransaction" => Transaction::from_value(data.clone())
                .map(|t| engine.submit(ProvisionalPayload::Transactions(vec![t]), EntryType::Temporary))
                .unwrap_or_default(),
            "commitTransaction" => data
                .as_str()
                .map(|id| engine.submit(ProvisionalPayload::TransactionIds(vec![id.to_string()]), EntryType::Commit))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn seal(&mut self, node_idx: usize, batch: CommitBatch) {
        let node = &mut self.nodes[node_idx];
        for (entry_type, payload) in batch.entries {
            match (entry_type, payload) {
                (EntryType::Normal, ProvisionalPayload::Transactions(ts)) => {
                    for t in ts {
                        node.pool.add_transaction(t);
                    }
                }
                (EntryType::Temporary, ProvisionalPayload::Transactions(ts)) => {
                    for t in ts {
                        node.pool.add_temporary_transaction(t, now_ms());
                    }
                }
                (EntryType::Commit, ProvisionalPayload::TransactionIds(ids)) => {
                    for id in ids {
                        let _ = node.pool.commit_transaction(&id);
                    }
                }
                _ => {}
            }
        }

        let Some(last) = node.store.latest().expect("read tip") else {
            return;
        };
        let drained = node.pool.drain();
        if drained.is_empty() {
            return;
        }
        let block = match commit_block(
            BLOCK_VERSION,
            now_ms(),
            LastBlock { index: last.index, hash: &last.hash },
            drained.clone(),
        ) {
            Ok(block) => block,
            Err(e) => {
                node.pool.requeue(drained);
                panic!("seal block: {e}");
            }
        };
        if let Err(e) = node.store.put_block(&block) {
            node.pool.requeue(drained);
            panic!("persist block: {e}");
        }
    }

    /// The block store belonging to node `idx`.
    pub fn store(&self, idx: usize) -> &BlockStore {
        &self.nodes[idx].store
    }

    /// Number of nodes in the cluster.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Remove every node's scratch storage directory.
    pub fn cleanup(&self) {
        for node in &self.nodes {
            cleanup(&node.path);
        }
    }
}
