//! Retention engine error types
//!
//! Defines all errors that can occur across the chunk, index and retention
//! layers, including the sentinel kinds the retention loop is allowed to
//! swallow (`ChunkNotFound` at delete time, `NoDataInRange` at rebound time).

use thiserror::Error;

/// Errors that can occur in the retention engine
#[derive(Error, Debug)]
pub enum RetentionError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Chunk key could not be parsed or lacks a tenant prefix
    #[error("Invalid chunk key: {0}")]
    InvalidChunkKey(String),

    /// The object store has no chunk under the given key
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    /// The object store returned an unexpected number of chunks for one key
    #[error("Expected 1 chunk for {key} but found {found} in storage")]
    ChunkCountMismatch { key: String, found: usize },

    /// Rebound produced no entries in the requested sub-interval
    #[error("No chunk data in requested range")]
    NoDataInRange,

    /// A table scan completed without observing a single chunk.
    /// The caller must not drop the table: either it is genuinely empty and
    /// should be removed by hand, or an earlier bug emptied the iterator.
    #[error("no chunks found in table; verify the table is really empty before dropping it")]
    NoChunksFound,

    /// Index engine failure
    #[error("Index error: {0}")]
    Index(String),

    /// Marker log failure
    #[error("Marker log error: {0}")]
    Marker(String),

    /// Invalid table name (interval cannot be derived)
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl RetentionError {
    /// True for delete-time misses the sweeper treats as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RetentionError::ChunkNotFound(_))
    }
}

impl From<bincode::Error> for RetentionError {
    fn from(err: bincode::Error) -> Self {
        RetentionError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RetentionError {
    fn from(err: serde_json::Error) -> Self {
        RetentionError::Serialization(err.to_string())
    }
}

/// Result type alias for retention operations
pub type RetentionResult<T> = Result<T, RetentionError>;
