//! Pending-transaction pool.
//!
//! Unlike the EVM-style pools this crate's predecessor managed (nonce
//! ordering, gas-price replacement, per-account queues), the ledger's pool
//! is a plain ordered sequence: transactions are opaque and unordered
//! relative to each other beyond submission order, and the only dedup rule
//! is "don't insert the same element twice" (spec §4.2) — identity-based,
//! via `Transaction::same_identity`, not content equality. Two transactions
//! built from identical JSON are distinct elements and both get pooled.

use ledger_types::Transaction;

use crate::error::{ChainError, ChainResult};

/// Per-node ordered sequence of transactions awaiting inclusion in a block.
#[derive(Debug, Default, Clone)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
}

impl TransactionPool {
    /// An empty pool, as created on node start.
    pub fn new() -> Self {
        TransactionPool {
            transactions: Vec::new(),
        }
    }

    /// Push `t` unless the same element is already pending.
    ///
    /// Returns `true` if the transaction was added. Dedup is by identity
    /// (`Transaction::same_identity`), not content: resubmitting a clone of
    /// a pending transaction is a no-op, but two independently built
    /// transactions with identical content both get pooled.
    pub fn add_transaction(&mut self, t: Transaction) -> bool {
        if self.transactions.iter().any(|existing| existing.same_identity(&t)) {
            return false;
        }
        self.transactions.push(t);
        true
    }

    /// Push `t` marked `@temp` at `timestamp_ms`, pending finalization by a
    /// matching `commitTransaction`.
    pub fn add_temporary_transaction(&mut self, mut t: Transaction, timestamp_ms: i64) -> bool {
        t.mark_temp(timestamp_ms);
        self.add_transaction(t)
    }

    /// Finalize a temporary transaction by `transactionId`, clearing its
    /// `@temp` annotation in place.
    pub fn commit_transaction(&mut self, transaction_id: &str) -> ChainResult<()> {
        let found = self
            .transactions
            .iter_mut()
            .find(|t| t.is_temp() && t.transaction_id() == Some(transaction_id));
        match found {
            Some(t) => {
                t.clear_temp();
                Ok(())
            }
            None => Err(ChainError::UnknownTemporaryTransaction(
                transaction_id.to_string(),
            )),
        }
    }

    /// Current pool contents, in submission order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Whether the pool has no pending transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Remove and return every pending transaction, emptying the pool. Used
    /// when a block is sealed.
    pub fn drain(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    /// Put a previously drained batch back at the front of the pool, ahead
    /// of whatever arrived while sealing was in flight. Used when a seal
    /// attempt fails after draining, so the batch is picked up by the next
    /// successful seal instead of being lost.
    pub fn requeue(&mut self, mut transactions: Vec<Transaction>) {
        transactions.extend(std::mem::take(&mut self.transactions));
        self.transactions = transactions;
    }
}
