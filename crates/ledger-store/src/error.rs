//! Block store error types.

use thiserror::Error;

/// Errors from the block store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// RocksDB error.
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid column family.
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// Database not open.
    #[error("database not open")]
    NotOpen,

    /// Database already open.
    #[error("database already open")]
    AlreadyOpen,

    /// `storage = "Simple"` (file-per-block) was requested; this
    /// implementation only provides the RocksDB-backed indexed variant.
    #[error("unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for block store operations.
pub type StoreResult<T> = Result<T, StoreError>;
