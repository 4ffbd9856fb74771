//! Cluster membership descriptor.

use ledger_primitives::NodeId;
use serde::{Deserialize, Serialize};

/// One cluster member, as listed in configuration's `nodes` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Cluster-unique node identifier.
    pub id: NodeId,
    /// Transport URL (`host:port` style) the node listens on.
    pub url: String,
}

/// Compute quorum size for a cluster of `total_nodes` members (self included).
pub fn quorum_size(total_nodes: usize) -> usize {
    total_nodes / 2 + 1
}
