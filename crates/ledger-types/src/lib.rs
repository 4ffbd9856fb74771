//! # ledger-types
//!
//! Core data types for the ledger node:
//! - [`Transaction`](transaction::Transaction) - opaque client-supplied JSON object
//! - [`Block`](block::Block) - hash-chained record of committed transactions
//! - [`BlockQuery`](query::BlockQuery) - the `getBlocks` query model
//! - [`Envelope`](envelope::Envelope) - the two-shape wire message envelope
//! - [`NodeDescriptor`](cluster::NodeDescriptor) - a cluster member

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod cluster;
pub mod envelope;
pub mod error;
pub mod query;
pub mod transaction;

pub use block::{Block, BlockHeader, BlockView, H0, POW_DIFFICULTY_PREFIX};
pub use cluster::{quorum_size, NodeDescriptor};
pub use envelope::Envelope;
pub use error::TypesError;
pub use query::{BlockQuery, ConditionOperation, ConditionValue, Direction, TransactionCondition, TransactionConditionSet};
pub use transaction::{Transaction, TEMP_FIELD, TRANSACTION_ID_FIELD};
