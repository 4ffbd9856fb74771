//! Block and block-header types.

use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;

/// Genesis root-hash constant (`H0` in the spec). Used in place of a real
/// Merkle root since the genesis block has no transactions.
pub const H0: &str = "1183f7f0cb6243e92d5e4ba2fb626b02bca27ffe89c77dcbd7003167405da253";

/// The ASCII prefix a Proof-of-Work block hash must begin with.
pub const POW_DIFFICULTY_PREFIX: &str = "0000";

/// An immutable, hash-chained record of committed transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block format version.
    pub version: String,
    /// Block height; 0 for genesis.
    pub index: u64,
    /// Milliseconds since epoch at seal time.
    pub timestamp: i64,
    /// Proof-of-Work nonce (always 0 outside PoW mode).
    pub nonce: u64,
    /// Hex hash of the previous block; empty for genesis.
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    /// Hex hash of this block.
    pub hash: String,
    /// Transactions included in this block, in commit order.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Build the genesis block: `prevHash = ""`, root hash `H0`, no transactions.
    pub fn genesis(version: impl Into<String>, timestamp: i64, hash: String) -> Self {
        Block {
            version: version.into(),
            index: 0,
            timestamp,
            nonce: 0,
            prev_hash: String::new(),
            hash,
            transactions: Vec::new(),
        }
    }

    /// Whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

/// Condensed block view returned when a query sets `headerOnly`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height.
    pub index: u64,
    /// Milliseconds since epoch at seal time.
    pub timestamp: i64,
    /// Number of transactions in the block.
    #[serde(rename = "transactionCount")]
    pub transaction_count: usize,
}

impl From<&Block> for BlockHeader {
    fn from(block: &Block) -> Self {
        BlockHeader {
            index: block.index,
            timestamp: block.timestamp,
            transaction_count: block.transactions.len(),
        }
    }
}

/// Either a full block or its condensed header, depending on `headerOnly`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockView {
    /// Full block.
    Full(Block),
    /// Header-only projection.
    Header(BlockHeader),
}
