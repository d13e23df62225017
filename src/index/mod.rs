//! Index table abstractions
//!
//! A table is a time-partitioned index shard whose interval is derived
//! solely from its name. The retention pipeline consumes a table through
//! three capabilities that must all operate on the same underlying table
//! for the duration of a scan:
//!
//! - streaming iteration over indexed chunks, with delete-on-true semantics
//! - upserting replacement chunks produced by rewrites
//! - dropping per-series metadata once every chunk of a series is gone
//!
//! Iteration and cleanup live on [`IndexProcessor`]; indexing lives on
//! [`ChunkIndexer`], which `for_each_chunk` hands back into the callback so
//! a rewrite can insert replacement chunks mid-scan.

pub mod memory;
pub mod table;

pub use memory::MemoryTableIndex;
pub use table::TableSchema;

use crate::chunk::types::{Chunk, ChunkEntry, Labels};
use crate::error::RetentionResult;

/// Write access to a table's chunk index
pub trait ChunkIndexer {
    /// Index a chunk built from an existing chunk during a rewrite.
    ///
    /// Idempotent upsert. Returns false (without error) when the chunk does
    /// not belong to this table; the caller then skips the upload.
    fn index_chunk(&mut self, chunk: &Chunk) -> RetentionResult<bool>;
}

/// Per-entry decision callback for [`IndexProcessor::for_each_chunk`].
///
/// Returning `Ok(true)` drops the index entry. The `ChunkIndexer` argument
/// is the same table, lent back for mid-scan inserts.
pub type ChunkEntryCallback<'a> =
    dyn FnMut(&mut dyn ChunkIndexer, ChunkEntry) -> RetentionResult<bool> + 'a;

/// Full index-table capability set consumed by the table marker
pub trait IndexProcessor: ChunkIndexer {
    /// Stream every indexed chunk through the callback.
    ///
    /// The first error aborts iteration and leaves unvisited entries in
    /// place.
    fn for_each_chunk(&mut self, cb: &mut ChunkEntryCallback<'_>) -> RetentionResult<()>;

    /// Drop per-series metadata. Only called for series whose every chunk
    /// was deleted from this table without a replacement being added.
    fn cleanup_series(&mut self, user_id: &str, labels: &Labels) -> RetentionResult<()>;
}
