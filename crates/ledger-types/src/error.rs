//! Error types for the core data model.

use thiserror::Error;

/// Errors constructing or interpreting core types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A transaction payload was not a JSON object.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
}
