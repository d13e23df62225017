//! Chunk rewriting for partial expiration
//!
//! When a chunk expires with surviving sub-intervals, the rewriter fetches
//! the source object, slices it to each surviving interval (applying the
//! row filter), and re-encodes each slice as a fresh chunk. A slice is
//! indexed first and uploaded only if the index accepted it: a crash
//! between the two leaves a dangling index entry that the next retention
//! cycle heals by regenerating the identical replacement chunk, whereas the
//! reverse ordering would orphan objects the sweeper can never find.

use crate::chunk::codec;
use crate::chunk::types::{Chunk, ChunkEntry, ChunkKey, IntervalFilter, TimeInterval};
use crate::chunk::ChunkStore;
use crate::error::{RetentionError, RetentionResult};
use crate::index::ChunkIndexer;

pub(crate) struct ChunkRewriter<'a> {
    chunk_store: &'a dyn ChunkStore,
    table_interval: TimeInterval,
}

impl<'a> ChunkRewriter<'a> {
    pub(crate) fn new(chunk_store: &'a dyn ChunkStore, table_interval: TimeInterval) -> Self {
        Self {
            chunk_store,
            table_interval,
        }
    }

    /// Rewrite the surviving intervals of a source chunk.
    ///
    /// Returns true iff at least one replacement chunk was both indexed and
    /// uploaded. Already-uploaded replacements are not rolled back on
    /// error; re-runs converge because replacement identity is
    /// deterministic.
    pub(crate) fn rewrite_chunk(
        &self,
        indexer: &mut dyn ChunkIndexer,
        entry: &ChunkEntry,
        interval_filters: &[IntervalFilter],
    ) -> RetentionResult<bool> {
        let key = ChunkKey::parse(&entry.chunk_ref.user_id, &entry.chunk_ref.chunk_id)?;

        let chunks = self.chunk_store.get_chunks(std::slice::from_ref(&key))?;
        if chunks.len() != 1 {
            return Err(RetentionError::ChunkCountMismatch {
                key: entry.chunk_ref.chunk_id.clone(),
                found: chunks.len(),
            });
        }
        let source = &chunks[0];

        let mut wrote_chunks = false;

        for ivf in interval_filters {
            let start = ivf.interval.start;
            let end = ivf.interval.end;

            let entries = match codec::rebound(&source.entries, start, end, ivf.filter.as_ref()) {
                Ok(entries) => entries,
                Err(RetentionError::NoDataInRange) => {
                    tracing::info!(
                        chunk_id = %entry.chunk_ref.chunk_id,
                        "rebound leaves an empty chunk"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Intervals outside this table belong to the table that covers
            // them; it will produce the replacement.
            if start > self.table_interval.end || end < self.table_interval.start {
                continue;
            }

            let new_chunk = Chunk::new(
                source.user_id.clone(),
                source.fingerprint,
                source.labels.clone(),
                start,
                end,
                entries,
            );

            // Upload only if an index entry was written
            if indexer.index_chunk(&new_chunk)? {
                self.chunk_store
                    .put_chunks(std::slice::from_ref(&new_chunk))?;
                wrote_chunks = true;
            }
        }

        Ok(wrote_chunks)
    }
}
