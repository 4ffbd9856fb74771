//! The node orchestrator (spec §4.4): message dispatch, the observer list,
//! startup bootstrap, and the consensus tagged variant (spec §9
//! "Dynamic-dispatch of consensus algorithm").

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use ledger_chain::{commit_block, get_proof_of_work, validate_chain, LastBlock, TransactionPool};
use ledger_consensus::{
    AppendMessage, CommitBatch, ConsensusAction, EntryType, ProvisionalPayload, RaftConfig, RaftEngine,
    SendTarget, VoteRequest, VotedReply,
};
use ledger_network::{NetworkConfig, NetworkEvent, NetworkService};
use ledger_primitives::NodeId;
use ledger_store::BlockStore;
use ledger_types::{Block, BlockQuery, Envelope, Transaction};

use crate::config::{ConsensusAlgorithm, NodeConfig};
use crate::error::{NodeError, NodeResult};
use crate::genesis::generate_genesis;

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as i64
}

/// The Raft/PoW tagged variant (spec §9).
enum Consensus {
    Raft(RaftEngine),
    Pow,
}

/// Orchestrates one ledger node: owns the store, the transaction pool, the
/// selected consensus algorithm, the network service, and the observer list.
pub struct Node {
    config: NodeConfig,
    store: BlockStore,
    pool: Mutex<TransactionPool>,
    consensus: Mutex<Consensus>,
    /// The `"block"` named mutex (spec §5): guards the commit-sweep-to-
    /// sealed-block critical section. `store`'s own internal lock already
    /// realizes the `"storage"` mutex.
    block_lock: Mutex<()>,
    observers: Mutex<Vec<NodeId>>,
    network: Arc<NetworkService>,
    timer_reset: Notify,
}

impl Node {
    /// Open the store, build the selected consensus engine, and construct
    /// (but do not start) the network service.
    pub fn new(config: NodeConfig) -> NodeResult<(Arc<Node>, mpsc::Receiver<NetworkEvent>)> {
        config.validate()?;
        let store = BlockStore::open(&config.storage_path, config.index_keys.clone())?;

        let peer_ids: Vec<NodeId> = config.peers().iter().map(|p| p.id.clone()).collect();
        let consensus = match config.consensus_algorithm {
            ConsensusAlgorithm::Raft => {
                let raft_config = RaftConfig {
                    keepalive_interval_ms: config.keepalive_interval,
                    election_min_interval_ms: config.election_min_interval,
                    election_max_interval_ms: config.election_max_interval,
                    consensus_interval_ms: config.consensus_interval,
                };
                Consensus::Raft(RaftEngine::new(config.id.clone(), peer_ids, raft_config))
            }
            ConsensusAlgorithm::Pow => Consensus::Pow,
        };

        let mut network = NetworkService::new(NetworkConfig {
            self_id: config.id.clone(),
            listen_addr: config.listen_addr()?,
        });
        let events = network.take_events().expect("events receiver not yet taken");

        let node = Arc::new(Node {
            config,
            store,
            pool: Mutex::new(TransactionPool::new()),
            consensus: Mutex::new(consensus),
            block_lock: Mutex::new(()),
            observers: Mutex::new(Vec::new()),
            network: Arc::new(network),
            timer_reset: Notify::new(),
        });
        Ok((node, events))
    }

    /// Start listening, dial configured peers, and attempt to catch the
    /// chain up from a peer before starting consensus (spec §4.4 "Startup
    /// sequence": `getNodes -> getBlocks(direction: forward) -> start
    /// consensus"`). Best-effort: a lone or first-booting node proceeds
    /// with an empty chain.
    pub async fn bootstrap(self: &Arc<Self>, events: &mut mpsc::Receiver<NetworkEvent>) -> NodeResult<()> {
        self.network.start().await?;

        for peer in self.config.peers() {
            let addr: SocketAddr = match peer.url.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    warn!("skipping peer {} with unparsable url {}: {}", peer.id, peer.url, e);
                    continue;
                }
            };
            if let Err(e) = self.network.connect(addr).await {
                debug!("could not dial peer {} at {}: {}", peer.id, addr, e);
            }
        }

        if let Some(peer_id) = self.network.connected_peer_ids().into_iter().next() {
            let query = BlockQuery { direction: ledger_types::Direction::Forward, ..Default::default() };
            let request = Envelope::command("getBlocks", serde_json::to_value(&query).expect("query serializes"));
            if self.network.send_to(&peer_id, request).await.is_ok() {
                let reply = tokio::time::timeout(Duration::from_millis(500), events.recv()).await;
                if let Ok(Some(NetworkEvent::Message { envelope, .. })) = reply {
                    if envelope.name() == "blocks" {
                        if let Err(e) = self.apply_incoming_blocks(envelope.data()).await {
                            warn!("failed to apply bootstrap chain sync: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Run the consensus timer loops and the inbound event loop until
    /// shutdown is signaled.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<NetworkEvent>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let is_raft = matches!(*self.consensus.lock(), Consensus::Raft(_));
        if is_raft {
            let node = self.clone();
            tokio::spawn(async move { node.election_timer_loop().await });
            let node = self.clone();
            tokio::spawn(async move { node.consensus_tick_loop().await });
            let node = self.clone();
            tokio::spawn(async move { node.backlog_retry_loop().await });
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_network_event(event).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// `terminate` (spec §5): stop accepting new connections. The store
    /// closes its RocksDB handle on drop; no explicit close step is needed.
    pub async fn stop(&self) {
        self.network.stop();
    }

    async fn election_timer_loop(self: Arc<Self>) {
        loop {
            let delay = match &*self.consensus.lock() {
                Consensus::Raft(engine) => engine.next_timer_delay(),
                Consensus::Pow => return,
            };
            tokio::select! {
                _ = sleep(delay) => {
                    let actions = match &mut *self.consensus.lock() {
                        Consensus::Raft(engine) => engine.on_timer(),
                        Consensus::Pow => vec![],
                    };
                    self.run_actions(actions).await;
                }
                _ = self.timer_reset.notified() => {}
            }
        }
    }

    async fn consensus_tick_loop(self: Arc<Self>) {
        if !matches!(*self.consensus.lock(), Consensus::Raft(_)) {
            return;
        }
        let interval = Duration::from_millis(self.config.consensus_interval);
        loop {
            sleep(interval).await;
            let actions = match &mut *self.consensus.lock() {
                Consensus::Raft(engine) => engine.on_consensus_tick(),
                Consensus::Pow => vec![],
            };
            self.run_actions(actions).await;
        }
    }

    async fn backlog_retry_loop(self: Arc<Self>) {
        if !matches!(*self.consensus.lock(), Consensus::Raft(_)) {
            return;
        }
        let interval = Duration::from_millis(self.config.election_max_interval);
        loop {
            sleep(interval).await;
            let actions = match &mut *self.consensus.lock() {
                Consensus::Raft(engine) => engine.retry_backlog(),
                Consensus::Pow => vec![],
            };
            self.run_actions(actions).await;
        }
    }

    async fn handle_network_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::PeerConnected(id) => info!("peer {} connected", id),
            NetworkEvent::PeerDisconnected(id) => {
                self.observers.lock().retain(|o| *o != id);
                info!("peer {} disconnected", id);
            }
            NetworkEvent::Message { from, envelope } => self.handle_envelope(from, envelope).await,
        }
    }

    /// Dispatch one inbound envelope (spec §4.4, §6). Unknown commands and
    /// malformed payloads are silently ignored (spec §7 error kinds 2, 5).
    async fn handle_envelope(&self, from: NodeId, envelope: Envelope) {
        let name = envelope.name().to_string();
        let data = envelope.data().clone();
        let result = match name.as_str() {
            "getNodes" => self.handle_get_nodes(&from).await,
            "getBlock" => self.handle_get_block(&from, &data).await,
            "getBlocks" => self.handle_get_blocks(&from, &data).await,
            "generateGenesisBlock" => self.handle_generate_genesis().await,
            "addTransaction" => self.handle_add_transaction(&data, EntryType::Normal).await,
            "addTemporaryTransaction" => self.handle_add_transaction(&data, EntryType::Temporary).await,
            "commitTransaction" => self.handle_commit_transaction(&data).await,
            "addObserver" => {
                self.observers.lock().push(from.clone());
                Ok(())
            }
            "getDiagnostics" => self.handle_get_diagnostics(&from).await,
            "vote" => self.handle_vote(&data).await,
            "append" => self.handle_append(&data).await,
            "startPow" => self.handle_start_pow(&from).await,
            "voted" => self.handle_voted(&data).await,
            "appended" => self.handle_appended(&data).await,
            "blocks" => self.apply_incoming_blocks(&data).await,
            "pow" => self.apply_incoming_blocks(&data).await,
            _ => {
                debug!("ignoring unrecognized message {}", name);
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!("error handling {} from {}: {}", name, from, e);
        }
    }

    async fn handle_get_nodes(&self, from: &NodeId) -> NodeResult<()> {
        let nodes: Vec<Value> = self.config.nodes.iter().map(|n| json!({"id": n.id.as_str(), "url": n.url})).collect();
        let reply = Envelope::push("nodes", Value::Array(nodes));
        self.network.send_to(from, reply).await?;
        Ok(())
    }

    async fn handle_get_block(&self, from: &NodeId, data: &Value) -> NodeResult<()> {
        let index = data.as_u64().ok_or_else(|| NodeError::Configuration("getBlock requires an integer index".to_string()))?;
        if let Some(block) = self.store.get_block(index)? {
            let reply = Envelope::push("block", serde_json::to_value(&block)?);
            self.network.send_to(from, reply).await?;
        }
        Ok(())
    }

    async fn handle_get_blocks(&self, from: &NodeId, data: &Value) -> NodeResult<()> {
        let query: BlockQuery = serde_json::from_value(data.clone()).unwrap_or_default();
        let views = self.store.restore_blocks(&query)?;
        let reply = Envelope::push("blocks", serde_json::to_value(&views)?);
        self.network.send_to(from, reply).await?;
        Ok(())
    }

    async fn handle_generate_genesis(&self) -> NodeResult<()> {
        let block = generate_genesis(&self.store, &self.config.block_version, now_ms())?;
        let reply = Envelope::push("blocks", serde_json::to_value(&[block])?);
        self.network.broadcast(reply).await;
        Ok(())
    }

    async fn handle_add_transaction(&self, data: &Value, entry_type: EntryType) -> NodeResult<()> {
        let values = match data {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let transactions = values.into_iter().map(Transaction::from_value).collect::<Result<Vec<_>, _>>()?;
        let payload = ProvisionalPayload::Transactions(transactions);
        self.submit(payload, entry_type).await
    }

    async fn handle_commit_transaction(&self, data: &Value) -> NodeResult<()> {
        let ids = match data {
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| NodeError::Configuration("commitTransaction expects a string id or array".to_string()))?,
            Value::String(s) => vec![s.clone()],
            _ => return Err(NodeError::Configuration("commitTransaction expects a string id or array".to_string())),
        };
        self.submit(ProvisionalPayload::TransactionIds(ids), EntryType::Commit).await
    }

    async fn submit(&self, payload: ProvisionalPayload, entry_type: EntryType) -> NodeResult<()> {
        let actions = match &mut *self.consensus.lock() {
            Consensus::Raft(engine) => engine.submit(payload, entry_type),
            Consensus::Pow => {
                // PoW mode has no replication step: apply directly to the pool.
                self.apply_to_pool(payload, entry_type);
                vec![]
            }
        };
        self.run_actions(actions).await;
        Ok(())
    }

    async fn handle_get_diagnostics(&self, from: &NodeId) -> NodeResult<()> {
        let last_index = self.store.latest()?.map(|l| l.index);
        let (state, term, leader_id, provisional) = match &*self.consensus.lock() {
            Consensus::Raft(engine) => (
                format!("{:?}", engine.state()),
                engine.term(),
                engine.leader_id().map(|id| id.to_string()),
                engine.provisional_block_count(),
            ),
            Consensus::Pow => ("Pow".to_string(), 0, None, 0),
        };
        let diagnostics = json!({
            "id": self.config.id.as_str(),
            "state": state,
            "term": term,
            "leaderId": leader_id,
            "provisionalBlockCount": provisional,
            "poolSize": self.pool.lock().len(),
            "lastBlockIndex": last_index,
        });
        let reply = Envelope::push("diagnostics", diagnostics);
        self.network.send_to(from, reply).await?;
        Ok(())
    }

    async fn handle_vote(&self, data: &Value) -> NodeResult<()> {
        let request: VoteRequest = serde_json::from_value(data.clone())?;
        let actions = match &mut *self.consensus.lock() {
            Consensus::Raft(engine) => engine.handle_vote(request),
            Consensus::Pow => vec![],
        };
        self.timer_reset.notify_one();
        self.run_actions(actions).await;
        Ok(())
    }

    async fn handle_voted(&self, data: &Value) -> NodeResult<()> {
        let reply: VotedReply = serde_json::from_value(data.clone())?;
        let actions = match &mut *self.consensus.lock() {
            Consensus::Raft(engine) => engine.handle_voted(reply),
            Consensus::Pow => vec![],
        };
        self.run_actions(actions).await;
        Ok(())
    }

    async fn handle_append(&self, data: &Value) -> NodeResult<()> {
        let msg: AppendMessage = serde_json::from_value(data.clone())?;
        let actions = match &mut *self.consensus.lock() {
            Consensus::Raft(engine) => engine.handle_append(msg),
            Consensus::Pow => vec![],
        };
        self.timer_reset.notify_one();
        self.run_actions(actions).await;
        Ok(())
    }

    async fn handle_appended(&self, data: &Value) -> NodeResult<()> {
        let msg = serde_json::from_value(data.clone())?;
        let actions = match &mut *self.consensus.lock() {
            Consensus::Raft(engine) => engine.handle_appended(msg),
            Consensus::Pow => vec![],
        };
        self.run_actions(actions).await;
        Ok(())
    }

    async fn handle_start_pow(&self, from: &NodeId) -> NodeResult<()> {
        let last = self.store.latest()?.ok_or_else(|| NodeError::Configuration("no genesis block yet".to_string()))?;
        let pool = self.pool.lock();
        let candidate = get_proof_of_work(LastBlock { index: last.index, hash: &last.hash }, pool.transactions())?;
        drop(pool);
        let reply = Envelope::push("candidateForPow", serde_json::to_value(&candidate)?);
        self.network.send_to(from, reply).await?;
        Ok(())
    }

    /// Replay a leader's commit batch (Raft) into the pool and seal a block
    /// under the `"block"` mutex (spec §4.1 "Commit sweep").
    async fn run_actions(&self, actions: Vec<ConsensusAction>) {
        for action in actions {
            match action {
                ConsensusAction::Send(SendTarget::Broadcast, envelope) => {
                    self.network.broadcast(envelope).await;
                }
                ConsensusAction::Send(SendTarget::Node(target), envelope) => {
                    if self.network.send_to(&target, envelope.clone()).await.is_err() {
                        self.requeue_on_failure(&envelope);
                    }
                }
                ConsensusAction::Commit(batch) => self.commit_and_seal(batch).await,
            }
        }
    }

    fn requeue_on_failure(&self, envelope: &Envelope) {
        let Consensus::Raft(engine) = &mut *self.consensus.lock() else { return };
        match envelope.name() {
            "addTransaction" => {
                if let Ok(t) = Transaction::from_value(envelope.data().clone()) {
                    engine.requeue_transaction(t);
                }
            }
            "addTemporaryTransaction" => {
                if let Ok(t) = Transaction::from_value(envelope.data().clone()) {
                    engine.requeue_temporary_transaction(t);
                }
            }
            "commitTransaction" => {
                if let Some(id) = envelope.data().as_str() {
                    engine.requeue_committed_transaction(id.to_string());
                }
            }
            _ => {}
        }
    }

    fn apply_to_pool(&self, payload: ProvisionalPayload, entry_type: EntryType) {
        let mut pool = self.pool.lock();
        match (entry_type, payload) {
            (EntryType::Normal, ProvisionalPayload::Transactions(ts)) => {
                for t in ts {
                    pool.add_transaction(t);
                }
            }
            (EntryType::Temporary, ProvisionalPayload::Transactions(ts)) => {
                for t in ts {
                    pool.add_temporary_transaction(t, now_ms());
                }
            }
            (EntryType::Commit, ProvisionalPayload::TransactionIds(ids)) => {
                for id in ids {
                    if let Err(e) = pool.commit_transaction(&id) {
                        debug!("commitTransaction for unknown id ignored: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    async fn commit_and_seal(&self, batch: CommitBatch) {
        // The guard never crosses an `.await`: parking_lot guards aren't
        // `Send`, and this runs inside a spawned task.
        let sealed = {
            let _guard = self.block_lock.lock();
            for (entry_type, payload) in batch.entries {
                self.apply_to_pool(payload, entry_type);
            }

            let last = match self.store.latest() {
                Ok(Some(last)) => last,
                Ok(None) => {
                    warn!("commit sweep ran before genesis was generated; dropping batch");
                    return;
                }
                Err(e) => {
                    warn!("failed to read chain tip before sealing: {}", e);
                    return;
                }
            };

            let drained = self.pool.lock().drain();
            if drained.is_empty() {
                return;
            }
            match commit_block(
                &self.config.block_version,
                now_ms(),
                LastBlock { index: last.index, hash: &last.hash },
                drained.clone(),
            ) {
                Ok(block) => {
                    if let Err(e) = self.store.put_block(&block) {
                        warn!("failed to persist sealed block: {}; requeuing {} transactions", e, drained.len());
                        self.pool.lock().requeue(drained);
                        return;
                    }
                    block
                }
                Err(e) => {
                    warn!("failed to seal block: {}; requeuing {} transactions", e, drained.len());
                    self.pool.lock().requeue(drained);
                    return;
                }
            }
        };
        self.notify_observers(&sealed).await;
    }

    async fn apply_incoming_blocks(&self, data: &Value) -> NodeResult<()> {
        let blocks: Vec<Block> = match data {
            Value::Array(_) => serde_json::from_value(data.clone())?,
            other => vec![serde_json::from_value(other.clone())?],
        };
        let _guard = self.block_lock.lock();
        let last = self.store.latest()?;
        let last_block = last.as_ref().map(|l| LastBlock { index: l.index, hash: &l.hash });
        let accepted = validate_chain(last_block, &blocks)?;
        for block in &accepted {
            self.store.put_block(block)?;
        }
        drop(_guard);
        for block in &accepted {
            if !block.is_genesis() {
                self.notify_observers(block).await;
            }
        }
        Ok(())
    }

    async fn notify_observers(&self, block: &Block) {
        let envelope = match serde_json::to_value(block) {
            Ok(v) => Envelope::push("block", v),
            Err(_) => return,
        };
        let observers = self.observers.lock().clone();
        let mut disconnected = Vec::new();
        for observer in observers {
            if self.network.send_to(&observer, envelope.clone()).await.is_err() {
                disconnected.push(observer);
            }
        }
        if !disconnected.is_empty() {
            self.observers.lock().retain(|o| !disconnected.contains(o));
        }
    }

    /// This node's own id.
    pub fn id(&self) -> &NodeId {
        &self.config.id
    }

    /// The network service, for tests and the PoW candidate-submission path.
    pub fn network(&self) -> &Arc<NetworkService> {
        &self.network
    }

    /// The underlying block store, for diagnostics and tests.
    pub fn store(&self) -> &BlockStore {
        &self.store
    }
}
