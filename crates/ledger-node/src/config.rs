//! Node configuration (spec §6 `Configuration`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ledger_primitives::NodeId;
use ledger_types::NodeDescriptor;

use crate::error::{NodeError, NodeResult};

/// Which consensus algorithm the node runs (spec §9 "Dynamic-dispatch of
/// consensus algorithm" tagged variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusAlgorithm {
    /// Leader-election-based replication (`ledger_consensus::RaftEngine`).
    Raft,
    /// Proof-of-Work block sealing.
    #[serde(rename = "PoW")]
    Pow,
}

/// Which block store backend to open. Only `LevelDb` (the RocksDB-backed
/// indexed store) is implemented; `Simple` is out of scope (spec §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    /// `ledger_store::BlockStore`, the indexed RocksDB-backed variant.
    #[serde(rename = "LevelDB")]
    LevelDb,
    /// The file-per-block variant; not implemented here.
    Simple,
}

/// Full node configuration, as loaded from a JSON or TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Block format version stamped into every sealed block.
    pub block_version: String,
    /// This node's cluster-unique id.
    pub id: NodeId,
    /// Local listen host.
    pub host: String,
    /// Local listen port.
    pub port: u16,
    /// Transport protocol label (carried through, not interpreted — the
    /// node always speaks length-prefixed JSON over TCP).
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Which consensus algorithm to run.
    pub consensus_algorithm: ConsensusAlgorithm,
    /// Which block store backend to open.
    pub storage: StorageBackend,
    /// Filesystem path the block store is rooted at.
    pub storage_path: PathBuf,
    /// Transaction attribute names to maintain a secondary index over.
    #[serde(default)]
    pub index_keys: Vec<String>,
    /// Leader heartbeat cadence, milliseconds.
    pub keepalive_interval: u64,
    /// Lower bound of the randomized election timeout, milliseconds.
    pub election_min_interval: u64,
    /// Upper bound (exclusive) of the randomized election timeout, milliseconds.
    pub election_max_interval: u64,
    /// Cadence of the leader's provisional-block commit sweep, milliseconds.
    pub consensus_interval: u64,
    /// Every cluster member, including self.
    pub nodes: Vec<NodeDescriptor>,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl NodeConfig {
    /// Load and validate configuration from a JSON or TOML file, dispatched
    /// on the path's extension (`.toml`, anything else is treated as JSON).
    pub fn load(path: impl AsRef<std::path::Path>) -> NodeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
        let config: NodeConfig = if is_toml {
            toml::from_str(&contents).map_err(|e| NodeError::Configuration(e.to_string()))?
        } else {
            serde_json::from_str(&contents).map_err(|e| NodeError::Configuration(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configuration this implementation cannot act on (spec §7
    /// error kind 6, fatal at startup only).
    pub fn validate(&self) -> NodeResult<()> {
        if self.storage == StorageBackend::Simple {
            return Err(NodeError::Configuration(
                "storage = \"Simple\" is not implemented; use \"LevelDB\"".to_string(),
            ));
        }
        if !self.nodes.iter().any(|n| n.id == self.id) {
            return Err(NodeError::Configuration(format!(
                "this node's id {} is not listed in its own `nodes` array",
                self.id
            )));
        }
        if self.election_min_interval >= self.election_max_interval {
            return Err(NodeError::Configuration(
                "electionMinInterval must be less than electionMaxInterval".to_string(),
            ));
        }
        Ok(())
    }

    /// Every other cluster member (excludes self).
    pub fn peers(&self) -> Vec<NodeDescriptor> {
        self.nodes.iter().filter(|n| n.id != self.id).cloned().collect()
    }

    /// Local listen address as `host:port`.
    pub fn listen_addr(&self) -> NodeResult<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| NodeError::Configuration(format!("invalid host/port: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_config(id: &str) -> NodeConfig {
        NodeConfig {
            block_version: "1.0".to_string(),
            id: NodeId::new(id),
            host: "127.0.0.1".to_string(),
            port: 7000,
            protocol: "tcp".to_string(),
            consensus_algorithm: ConsensusAlgorithm::Raft,
            storage: StorageBackend::LevelDb,
            storage_path: PathBuf::from("/tmp/ledger-data"),
            index_keys: vec!["articleCode".to_string()],
            keepalive_interval: 1000,
            election_min_interval: 2000,
            election_max_interval: 4000,
            consensus_interval: 200,
            nodes: vec![
                NodeDescriptor { id: NodeId::new("n1"), url: "127.0.0.1:7000".to_string() },
                NodeDescriptor { id: NodeId::new("n2"), url: "127.0.0.1:7001".to_string() },
            ],
        }
    }

    #[test]
    fn test_parses_camel_case_schema() {
        let json = json!({
            "blockVersion": "1.0",
            "id": "n1",
            "host": "127.0.0.1",
            "port": 7000,
            "consensusAlgorithm": "Raft",
            "storage": "LevelDB",
            "storagePath": "/tmp/ledger-data",
            "indexKeys": ["articleCode"],
            "keepaliveInterval": 1000,
            "electionMinInterval": 2000,
            "electionMaxInterval": 4000,
            "consensusInterval": 200,
            "nodes": [{"id": "n1", "url": "127.0.0.1:7000"}],
        });
        let config: NodeConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.id, NodeId::new("n1"));
        assert_eq!(config.consensus_algorithm, ConsensusAlgorithm::Raft);
        assert_eq!(config.protocol, "tcp");
    }

    #[test]
    fn test_validate_rejects_simple_storage() {
        let mut config = sample_config("n1");
        config.storage = StorageBackend::Simple;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_self_not_in_nodes() {
        let config = sample_config("missing-node");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_election_bounds() {
        let mut config = sample_config("n1");
        config.election_min_interval = 5000;
        config.election_max_interval = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_peers_excludes_self() {
        let config = sample_config("n1");
        let peers = config.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, NodeId::new("n2"));
    }

    #[test]
    fn test_listen_addr() {
        let config = sample_config("n1");
        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn test_load_dispatches_on_toml_extension() {
        let toml = r#"
            blockVersion = "1.0"
            id = "n1"
            host = "127.0.0.1"
            port = 7000
            consensusAlgorithm = "Raft"
            storage = "LevelDB"
            storagePath = "/tmp/ledger-data"
            indexKeys = ["articleCode"]
            keepaliveInterval = 1000
            electionMinInterval = 2000
            electionMaxInterval = 4000
            consensusInterval = 200

            [[nodes]]
            id = "n1"
            url = "127.0.0.1:7000"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, toml).unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.id, NodeId::new("n1"));
        assert_eq!(config.consensus_algorithm, ConsensusAlgorithm::Raft);
    }

    #[test]
    fn test_load_defaults_to_json_for_other_extensions() {
        let json = serde_json::to_string(&sample_config("n1")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, json).unwrap();

        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.id, NodeId::new("n1"));
    }
}
