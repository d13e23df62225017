//! In-memory table index
//!
//! A complete [`IndexProcessor`] backed by plain collections, with optional
//! JSON snapshot persistence. Embedded deployments use it as the index
//! engine for small tables; the retention tests use it as the reference
//! table implementation.
//!
//! Series identifiers follow the crate convention: the hex form of the
//! label fingerprint, as bytes.

use crate::chunk::types::{Chunk, ChunkEntry, ChunkRef, Labels, TimeInterval};
use crate::error::{RetentionError, RetentionResult};
use crate::index::{ChunkEntryCallback, ChunkIndexer, IndexProcessor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Series identifier for a label set: hex fingerprint as bytes
pub fn series_id_for(labels: &Labels) -> Vec<u8> {
    format!("{:016x}", labels.fingerprint()).into_bytes()
}

/// Snapshot format for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    table_name: String,
    interval: TimeInterval,
    chunks: Vec<ChunkEntry>,
    series: Vec<SeriesSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SeriesSnapshot {
    user_id: String,
    labels: Labels,
}

/// In-memory index for one time-partitioned table
#[derive(Debug)]
pub struct MemoryTableIndex {
    table_name: String,
    interval: TimeInterval,
    chunks: Vec<ChunkEntry>,
    /// (user_id, series_id) → labels
    series: HashMap<(String, Vec<u8>), Labels>,
}

impl MemoryTableIndex {
    pub fn new(table_name: impl Into<String>, interval: TimeInterval) -> Self {
        Self {
            table_name: table_name.into(),
            interval,
            chunks: Vec::new(),
            series: HashMap::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    /// Add an index entry for an already-stored chunk
    pub fn add_entry(&mut self, entry: ChunkEntry) {
        let key = (
            entry.chunk_ref.user_id.clone(),
            entry.chunk_ref.series_id.clone(),
        );
        self.series.entry(key).or_insert_with(|| entry.labels.clone());
        self.chunks.push(entry);
    }

    /// Convenience: index a chunk reference built from its parts
    pub fn add_chunk(
        &mut self,
        user_id: impl Into<String>,
        labels: Labels,
        chunk_id: impl Into<String>,
        from: i64,
        through: i64,
    ) {
        let user_id = user_id.into();
        let entry = ChunkEntry {
            chunk_ref: ChunkRef {
                user_id,
                series_id: series_id_for(&labels),
                chunk_id: chunk_id.into(),
                from,
                through,
            },
            labels,
        };
        self.add_entry(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk identifiers currently indexed, in index order
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks
            .iter()
            .map(|e| e.chunk_ref.chunk_id.clone())
            .collect()
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn has_series(&self, user_id: &str, labels: &Labels) -> bool {
        self.series
            .contains_key(&(user_id.to_string(), series_id_for(labels)))
    }

    /// Save a JSON snapshot of the table
    pub fn save(&self, path: &Path) -> RetentionResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = IndexSnapshot {
            table_name: self.table_name.clone(),
            interval: self.interval,
            chunks: self.chunks.clone(),
            series: self
                .series
                .iter()
                .map(|((user_id, _), labels)| SeriesSnapshot {
                    user_id: user_id.clone(),
                    labels: labels.clone(),
                })
                .collect(),
        };

        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load a table from a JSON snapshot
    pub fn load(path: &Path) -> RetentionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&content)?;

        let mut index = Self::new(snapshot.table_name, snapshot.interval);
        for series in snapshot.series {
            let key = (series.user_id.clone(), series_id_for(&series.labels));
            index.series.insert(key, series.labels);
        }
        for entry in snapshot.chunks {
            index.add_entry(entry);
        }
        Ok(index)
    }
}

impl ChunkIndexer for MemoryTableIndex {
    fn index_chunk(&mut self, chunk: &Chunk) -> RetentionResult<bool> {
        // Refuse chunks that do not belong to this table
        if chunk.from > self.interval.end || chunk.through < self.interval.start {
            return Ok(false);
        }

        let chunk_id = chunk.external_key();
        if self.chunks.iter().any(|e| e.chunk_ref.chunk_id == chunk_id) {
            return Ok(true);
        }

        self.add_chunk(
            chunk.user_id.clone(),
            chunk.labels.clone(),
            chunk_id,
            chunk.from,
            chunk.through,
        );
        Ok(true)
    }
}

impl IndexProcessor for MemoryTableIndex {
    fn for_each_chunk(&mut self, cb: &mut ChunkEntryCallback<'_>) -> RetentionResult<()> {
        // Iterate a snapshot so the callback can re-enter through the
        // indexer handle; chunks indexed mid-scan are not visited.
        let snapshot = std::mem::take(&mut self.chunks);
        let mut kept: Vec<ChunkEntry> = Vec::with_capacity(snapshot.len());
        let mut iter = snapshot.into_iter();

        let result = loop {
            let Some(entry) = iter.next() else {
                break Ok(());
            };
            match cb(self, entry.clone()) {
                Ok(true) => {}
                Ok(false) => kept.push(entry),
                Err(e) => {
                    // Retain the current and unvisited entries for a retry
                    kept.push(entry);
                    kept.extend(iter);
                    break Err(e);
                }
            }
        };

        // Entries indexed by the callback landed in self.chunks; keep them
        // after the survivors
        kept.append(&mut self.chunks);
        self.chunks = kept;
        result
    }

    fn cleanup_series(&mut self, user_id: &str, labels: &Labels) -> RetentionResult<()> {
        let key = (user_id.to_string(), series_id_for(labels));
        if self
            .chunks
            .iter()
            .any(|e| e.chunk_ref.user_id == key.0 && e.chunk_ref.series_id == key.1)
        {
            return Err(RetentionError::Index(format!(
                "cleanup of series {} for user {} with chunks still indexed",
                labels, user_id
            )));
        }
        self.series.remove(&key);
        Ok(())
    }
}
