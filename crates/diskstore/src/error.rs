//! Store error types.

use thiserror::Error;

use crate::converter::ConverterError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error (file creation, deletion, or rename failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encode/decode failure reported by the converter.
    ///
    /// The backing file is left in its prior valid state when this occurs
    /// during a write.
    #[error("converter error: {0}")]
    Converter(#[from] ConverterError),

    /// Operation invoked on a store whose backing file has been deleted.
    ///
    /// A deleted store is permanently unusable; obtain a fresh instance from
    /// the provider to reuse the key.
    #[error("store has been deleted")]
    Deleted,

    /// Positional list operation outside the current list bounds.
    #[error("index {index} out of bounds for list of length {len}")]
    OutOfBounds { index: usize, len: usize },

    /// Invalid store key (empty or containing path separators).
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl StoreError {
    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Create an IO error with a plain message.
    pub(crate) fn io(message: impl Into<String>) -> Self {
        Self::Io(std::io::Error::other(message.into()))
    }
}
