//! The indexed block store (spec §4.3): a primary keyspace ordered by block
//! index, plus one secondary index per configured `indexKey` mapping an
//! attribute value to the block indexes containing a transaction with that
//! value.

use std::collections::HashSet;
use std::path::Path;

use parking_lot::Mutex;
use serde_json::Value;

use ledger_types::{Block, BlockHeader, BlockQuery, BlockView, ConditionValue, Direction, Transaction};

use crate::db::{Database, MAIN_CF};
use crate::error::{StoreError, StoreResult};
use crate::query_eval::{filter_transactions, stringify_value};

/// The chain tip as last observed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBlockRecord {
    /// Index of the last sealed block.
    pub index: u64,
    /// Hash of the last sealed block.
    pub hash: String,
}

/// RocksDB-backed block store.
pub struct BlockStore {
    db: Database,
    index_keys: Vec<String>,
    write_lock: Mutex<()>,
}

impl BlockStore {
    /// Open (creating if missing) a block store at `path`, with one
    /// secondary index per entry in `index_keys`.
    pub fn open(path: impl AsRef<Path>, index_keys: Vec<String>) -> StoreResult<Self> {
        let db = Database::new(path, index_keys.clone());
        db.open()?;
        Ok(BlockStore {
            db,
            index_keys,
            write_lock: Mutex::new(()),
        })
    }

    /// The configured secondary index keys.
    pub fn index_keys(&self) -> &[String] {
        &self.index_keys
    }

    /// Append a block to the primary keyspace and update every secondary
    /// index its transactions touch. Serialized by an internal lock: callers
    /// don't need to hold their own mutex across this call.
    pub fn put_block(&self, block: &Block) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let bytes = serde_json::to_vec(block).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db.put(MAIN_CF, &block.index.to_be_bytes(), &bytes)?;

        for index_key in &self.index_keys {
            for tx in &block.transactions {
                if let Some(value) = tx.get(index_key) {
                    self.update_index(index_key, value, block.index)?;
                }
            }
        }
        Ok(())
    }

    fn update_index(&self, index_key: &str, value: &Value, block_index: u64) -> StoreResult<()> {
        let raw_key = stringify_value(value);
        let existing = self.db.get(index_key, raw_key.as_bytes())?;
        let mut indexes: Vec<u64> = match existing {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization(e.to_string()))?
            }
            None => Vec::new(),
        };
        if !indexes.contains(&block_index) {
            indexes.push(block_index);
            indexes.sort_unstable();
        }
        let bytes = serde_json::to_vec(&indexes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db.put(index_key, raw_key.as_bytes(), &bytes)?;
        Ok(())
    }

    /// Fetch a single block by index.
    pub fn get_block(&self, index: u64) -> StoreResult<Option<Block>> {
        match self.db.get(MAIN_CF, &index.to_be_bytes())? {
            Some(bytes) => {
                let block = serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    /// The current chain tip, or `None` before genesis has been written.
    pub fn latest(&self) -> StoreResult<Option<LastBlockRecord>> {
        match self.db.last(MAIN_CF)? {
            Some((_, bytes)) => {
                let block: Block =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization(e.to_string()))?;
                Ok(Some(LastBlockRecord {
                    index: block.index,
                    hash: block.hash,
                }))
            }
            None => Ok(None),
        }
    }

    fn scan_all(&self, direction: Direction) -> StoreResult<Vec<Block>> {
        let ascending = matches!(direction, Direction::Forward);
        let raw = self.db.scan(MAIN_CF, ascending)?;
        raw.into_iter()
            .map(|(_, v)| serde_json::from_slice(&v).map_err(|e| StoreError::Deserialization(e.to_string())))
            .collect()
    }

    fn index_lookup(&self, index_key: &str, value: &Value) -> StoreResult<Vec<u64>> {
        let raw_key = stringify_value(value);
        match self.db.get(index_key, raw_key.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// When every mentioned key is a configured index and no stage uses
    /// `between` or `ambiguous` matching, resolve a safe superset of
    /// candidate block indexes via the secondary indexes instead of
    /// scanning the whole primary keyspace. `restore_blocks` re-applies the
    /// full filter in memory regardless, so over-inclusion here is harmless.
    fn fast_path_candidates(&self, query: &BlockQuery) -> StoreResult<Option<Vec<u64>>> {
        let Some(condition_set) = &query.transaction_condition else {
            return Ok(None);
        };
        if condition_set.has_between() {
            return Ok(None);
        }
        if condition_set.stages().iter().any(|s| s.ambiguous) {
            return Ok(None);
        }
        let mentioned = condition_set.mentioned_keys();
        if mentioned.iter().any(|k| !self.index_keys.iter().any(|ik| ik == k)) {
            return Ok(None);
        }

        let mut union = HashSet::new();
        for stage in condition_set.stages() {
            for (key, value) in &stage.conditions {
                if let ConditionValue::Scalar(v) = value {
                    union.extend(self.index_lookup(key, v)?);
                }
            }
        }
        Ok(Some(union.into_iter().collect()))
    }

    /// Evaluate a `getBlocks` query (spec §6 `restoreBlocks`): genesis is
    /// never returned, blocks outside the timestamp bounds are dropped, a
    /// `transactionCondition` narrows each block's transactions (blocks left
    /// with none are dropped entirely), and the surviving sequence is paged
    /// by `offset`/`limit` in `direction` order.
    pub fn restore_blocks(&self, query: &BlockQuery) -> StoreResult<Vec<BlockView>> {
        let blocks = match self.fast_path_candidates(query)? {
            Some(mut indexes) => {
                indexes.sort_unstable();
                if query.direction == Direction::Backward {
                    indexes.reverse();
                }
                let mut blocks = Vec::with_capacity(indexes.len());
                for index in indexes {
                    if let Some(block) = self.get_block(index)? {
                        blocks.push(block);
                    }
                }
                blocks
            }
            None => self.scan_all(query.direction)?,
        };

        let mut results = Vec::new();
        let mut skipped = 0usize;
        for block in blocks {
            if block.is_genesis() {
                continue;
            }
            if let Some(start) = query.timestamp_start {
                if block.timestamp < start {
                    continue;
                }
            }
            if let Some(end) = query.timestamp_end {
                if block.timestamp > end {
                    continue;
                }
            }

            let surviving: Vec<Transaction> = match &query.transaction_condition {
                Some(condition_set) => filter_transactions(&block.transactions, condition_set)
                    .into_iter()
                    .cloned()
                    .collect(),
                None => block.transactions.clone(),
            };
            if query.transaction_condition.is_some() && surviving.is_empty() {
                continue;
            }

            if skipped < query.offset {
                skipped += 1;
                continue;
            }
            if results.len() >= query.limit {
                break;
            }

            let mut emitted = block;
            emitted.transactions = surviving;
            let view = if query.header_only {
                BlockView::Header(BlockHeader::from(&emitted))
            } else {
                BlockView::Full(emitted)
            };
            results.push(view);
        }
        Ok(results)
    }
}
