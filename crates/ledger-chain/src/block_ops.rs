//! Block hashing, sealing, Proof-of-Work search, and chain validation.

use ledger_crypto::sha256_hex;
use ledger_types::{Block, Transaction, H0, POW_DIFFICULTY_PREFIX};

use crate::error::{ChainError, ChainResult};
use crate::merkle::merkle_root;

/// `SHA256_hex(prevHash || dec(nonce) || rootHash)`.
pub fn compute_block_hash(prev_hash: &str, nonce: u64, root_hash: &str) -> String {
    sha256_hex(format!("{prev_hash}{nonce}{root_hash}").as_bytes())
}

/// The last sealed block's index and hash, as read from the store. `None`
/// before genesis has been generated.
#[derive(Debug, Clone, Copy)]
pub struct LastBlock<'a> {
    /// Last sealed block's index.
    pub index: u64,
    /// Last sealed block's hash.
    pub hash: &'a str,
}

/// Build the genesis block: `prevHash = ""`, root hash `H0`, no transactions.
pub fn generate_genesis_block(version: impl Into<String>, timestamp: i64, nonce: u64) -> Block {
    let hash = compute_block_hash("", nonce, H0);
    let mut block = Block::genesis(version, timestamp, hash);
    block.nonce = nonce;
    block
}

/// `commitBlock()` (Raft mode): seal the pool's current contents into the
/// next block. Requires a non-empty pool; the caller drains the pool and
/// passes the drained transactions in.
pub fn commit_block(
    version: impl Into<String>,
    timestamp: i64,
    last: LastBlock<'_>,
    transactions: Vec<Transaction>,
) -> ChainResult<Block> {
    if transactions.is_empty() {
        return Err(ChainError::EmptyPool);
    }
    let root_hash = merkle_root(&transactions).expect("non-empty transactions has a root");
    let hash = compute_block_hash(last.hash, 0, &root_hash);
    Ok(Block {
        version: version.into(),
        index: last.index + 1,
        timestamp,
        nonce: 0,
        prev_hash: last.hash.to_string(),
        hash,
        transactions,
    })
}

/// A Proof-of-Work candidate: the next index, the pool's Merkle root, and a
/// nonce that makes the resulting hash meet the difficulty prefix.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PowCandidate {
    /// Index the sealed block would take.
    pub index: u64,
    /// Merkle root of the pool at candidate-search time.
    #[serde(rename = "rootHash")]
    pub root_hash: String,
    /// Nonce satisfying the difficulty prefix.
    pub nonce: u64,
}

/// `getProofOfWork()`: search for a nonce without mutating pool or store.
pub fn get_proof_of_work(
    last: LastBlock<'_>,
    pending_transactions: &[Transaction],
) -> ChainResult<PowCandidate> {
    if pending_transactions.is_empty() {
        return Err(ChainError::EmptyPool);
    }
    let root_hash = merkle_root(pending_transactions).expect("non-empty pool has a root");
    let nonce = proof_of_work_nonce(last.hash, &root_hash);
    Ok(PowCandidate {
        index: last.index + 1,
        root_hash,
        nonce,
    })
}

/// Starting from `nonce = 0`, increment until the resulting block hash
/// begins with `"0000"`.
pub fn proof_of_work_nonce(prev_hash: &str, root_hash: &str) -> u64 {
    let mut nonce = 0u64;
    loop {
        let hash = compute_block_hash(prev_hash, nonce, root_hash);
        if hash.starts_with(POW_DIFFICULTY_PREFIX) {
            return nonce;
        }
        nonce += 1;
    }
}

/// `commitProofOfWork(index, rootHash, nonce)`: re-validate a candidate
/// against the current pool/store state before sealing. Returns `Ok(None)`
/// for the already-sealed no-op case (`index <= last.index`).
pub fn commit_proof_of_work(
    version: impl Into<String>,
    timestamp: i64,
    last: LastBlock<'_>,
    index: u64,
    root_hash: &str,
    nonce: u64,
    transactions: Vec<Transaction>,
) -> ChainResult<Option<Block>> {
    if index <= last.index {
        return Ok(None);
    }

    let current_root = merkle_root(&transactions).ok_or(ChainError::EmptyPool)?;
    if current_root != root_hash {
        return Err(ChainError::RootHashMismatch {
            expected: current_root,
            got: root_hash.to_string(),
        });
    }

    let hash = compute_block_hash(last.hash, nonce, root_hash);
    if !hash.starts_with(POW_DIFFICULTY_PREFIX) {
        return Err(ChainError::DifficultyNotMet(hash));
    }

    Ok(Some(Block {
        version: version.into(),
        index: last.index + 1,
        timestamp,
        nonce,
        prev_hash: last.hash.to_string(),
        hash,
        transactions,
    }))
}

/// `setBlocks`: validate an incoming sequence of blocks against the current
/// chain tip. Blocks at or before the current tip are dropped; the
/// remainder must be contiguous and internally consistent, or nothing is
/// accepted (all-or-nothing).
pub fn validate_chain(last: Option<LastBlock<'_>>, incoming: &[Block]) -> ChainResult<Vec<Block>> {
    let last_index = last.map(|l| l.index);
    let mut prev_hash = last.map(|l| l.hash.to_string());
    let mut expected_index = last.map(|l| l.index + 1).unwrap_or(0);

    let mut accepted = Vec::new();
    for block in incoming {
        if let Some(li) = last_index {
            if block.index <= li {
                continue;
            }
        }

        if block.index != expected_index {
            return Err(ChainError::InvalidChain {
                index: block.index,
                reason: format!("expected index {expected_index}, got {}", block.index),
            });
        }

        if block.index == 0 {
            // Genesis has no computable root hash; validated by its fixed
            // structure only (no transactions, empty prevHash).
            if !block.prev_hash.is_empty() || !block.transactions.is_empty() {
                return Err(ChainError::InvalidChain {
                    index: block.index,
                    reason: "malformed genesis block".to_string(),
                });
            }
        } else {
            let expected_prev = prev_hash.clone().unwrap_or_default();
            if block.prev_hash != expected_prev {
                return Err(ChainError::InvalidChain {
                    index: block.index,
                    reason: "prevHash does not match predecessor".to_string(),
                });
            }

            let root_hash = merkle_root(&block.transactions).ok_or_else(|| ChainError::InvalidChain {
                index: block.index,
                reason: "non-genesis block has no transactions".to_string(),
            })?;
            let expected_hash = compute_block_hash(&block.prev_hash, block.nonce, &root_hash);
            if block.hash != expected_hash {
                return Err(ChainError::InvalidChain {
                    index: block.index,
                    reason: "hash does not match recomputed value".to_string(),
                });
            }
        }

        prev_hash = Some(block.hash.clone());
        expected_index += 1;
        accepted.push(block.clone());
    }

    Ok(accepted)
}
