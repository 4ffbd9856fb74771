//! # ledger-store
//!
//! The indexed block store: a RocksDB-backed primary keyspace ordered by
//! block index, plus a secondary index per configured `indexKey` letting
//! `restoreBlocks` resolve equality and disjunction queries without a full
//! scan. [`block_store::BlockStore`] is the crate's public surface;
//! [`db::Database`] is the thin dynamic-column-family RocksDB wrapper it
//! sits on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block_store;
pub mod db;
pub mod error;
pub mod query_eval;

pub use block_store::{BlockStore, LastBlockRecord};
pub use db::{DbConfig, MAIN_CF};
pub use error::{StoreError, StoreResult};
