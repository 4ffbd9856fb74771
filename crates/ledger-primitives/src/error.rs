//! Common error types for primitives

use crate::hash::HashError;
use thiserror::Error;

/// Primitive operation error
#[derive(Debug, Error)]
pub enum PrimitivesError {
    /// Hash error
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}
