//! Genesis block generation (spec §6 `generateGenesisBlock`, §8 scenario 1).

use ledger_chain::generate_genesis_block;
use ledger_store::BlockStore;
use ledger_types::Block;

use crate::error::NodeResult;

/// Seal and persist the genesis block if the store is still empty.
/// Re-invoking `generateGenesisBlock` against an already-initialized node is
/// a silent no-op: the existing genesis block is returned unchanged.
pub fn generate_genesis(store: &BlockStore, block_version: &str, timestamp_ms: i64) -> NodeResult<Block> {
    if let Some(last) = store.latest()? {
        if let Some(existing) = store.get_block(last.index)? {
            if existing.is_genesis() {
                return Ok(existing);
            }
        }
    }
    let block = generate_genesis_block(block_version, timestamp_ms, 0);
    store.put_block(&block)?;
    Ok(block)
}
