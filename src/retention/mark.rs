//! Table marking
//!
//! `TableMarker` drives the mark phase for one `(table, tenant)` pair: it
//! streams the table's index entries, consults the expiration policy per
//! chunk, rewrites partially expired chunks, drops index entries, appends
//! doomed chunk identifiers to a fresh marker log, and finally removes the
//! series whose every chunk disappeared.
//!
//! The scan runs synchronously on the caller's thread; callers processing
//! tables concurrently must pass disjoint `(table, tenant)` pairs.

use crate::chunk::types::TimeInterval;
use crate::chunk::ChunkStore;
use crate::error::{RetentionError, RetentionResult};
use crate::index::{IndexProcessor, TableSchema};
use crate::retention::expiration::ExpirationChecker;
use crate::retention::marker::MarkerWriter;
use crate::retention::metrics::{MarkerMetrics, TableAction};
use crate::retention::rewrite::ChunkRewriter;
use crate::retention::series::UserSeriesMap;
use crate::retention::CancelFlag;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Marks expired chunks across table scans
pub struct TableMarker {
    working_dir: PathBuf,
    schema: TableSchema,
    expiration: Arc<dyn ExpirationChecker>,
    chunk_store: Arc<dyn ChunkStore>,
    metrics: Arc<MarkerMetrics>,
}

impl TableMarker {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        schema: TableSchema,
        expiration: Arc<dyn ExpirationChecker>,
        chunk_store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            schema,
            expiration,
            chunk_store,
            metrics: Arc::new(MarkerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<MarkerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Mark all expired chunks of one table.
    ///
    /// Returns `(empty, modified)`: `empty` is true iff every chunk in the
    /// table was marked for deletion (the caller may then drop the whole
    /// table); `modified` is true iff the index or chunk store was changed.
    /// On error, partial progress may have been made and both flags are
    /// meaningless; marks already written stay durable.
    pub fn mark_for_delete(
        &self,
        cancel: &CancelFlag,
        table_name: &str,
        user_id: &str,
        index: &mut dyn IndexProcessor,
    ) -> RetentionResult<(bool, bool)> {
        let started = Instant::now();
        tracing::debug!(table = table_name, user = user_id, "starting to process table");

        let result = self.mark_table(cancel, table_name, index);
        match &result {
            Ok((true, _)) => self.metrics.record_table(TableAction::Deleted),
            Ok((false, true)) => self.metrics.record_table(TableAction::Modified),
            Ok((false, false)) => self.metrics.record_table(TableAction::None),
            Err(_) => self.metrics.record_table(TableAction::Failure),
        }

        tracing::debug!(
            table = table_name,
            user = user_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "finished processing table"
        );
        result
    }

    fn mark_table(
        &self,
        cancel: &CancelFlag,
        table_name: &str,
        index: &mut dyn IndexProcessor,
    ) -> RetentionResult<(bool, bool)> {
        let table_interval = self.schema.interval_of(table_name)?;
        cancel.check()?;

        let mut marker = MarkerWriter::new(&self.working_dir)
            .map_err(|e| RetentionError::Marker(format!("failed to create marker writer: {}", e)))?;

        let scan = cancel.check().and_then(|_| {
            let rewriter = ChunkRewriter::new(self.chunk_store.as_ref(), table_interval);
            mark_for_delete_inner(
                cancel,
                table_interval,
                &mut marker,
                index,
                self.expiration.as_ref(),
                &rewriter,
            )
        });

        // Publish whatever was marked, even on a failed or cancelled scan:
        // partial marker progress must stay durable for the sweeper.
        let marks = marker.count();
        let close_result = marker
            .close()
            .map_err(|e| RetentionError::Marker(format!("failed to close marker writer: {}", e)));

        let (empty, modified) = scan?;
        close_result?;
        self.metrics.add_marks(marks);
        Ok((empty, modified))
    }
}

/// The per-chunk decision procedure, applied over one full table scan
fn mark_for_delete_inner(
    cancel: &CancelFlag,
    table_interval: TimeInterval,
    marker: &mut MarkerWriter,
    index: &mut dyn IndexProcessor,
    expiration: &dyn ExpirationChecker,
    rewriter: &ChunkRewriter<'_>,
) -> RetentionResult<(bool, bool)> {
    let mut series_map = UserSeriesMap::new();
    let mut empty = true;
    let mut modified = false;
    let mut chunks_found = false;
    let now = Utc::now().timestamp_millis();

    index.for_each_chunk(&mut |indexer, entry| {
        cancel.check()?;
        chunks_found = true;
        series_map.add(
            &entry.chunk_ref.series_id,
            &entry.chunk_ref.user_id,
            &entry.labels,
        );

        // See if the chunk is deleted completely or partially
        let (expired, surviving) = expiration.expired(&entry, now);
        if expired {
            if !surviving.is_empty() {
                let wrote = rewriter
                    .rewrite_chunk(indexer, &entry, &surviving)
                    .map_err(|e| {
                        tracing::error!(
                            chunk_id = %entry.chunk_ref.chunk_id,
                            "failed to rewrite chunk: {}", e
                        );
                        e
                    })?;

                if wrote {
                    // A replacement chunk keeps the table non-empty and the
                    // series alive
                    empty = false;
                    series_map
                        .mark_series_not_deleted(&entry.chunk_ref.series_id, &entry.chunk_ref.user_id);
                }
            }

            modified = true;

            // Mark the chunk for deletion only if it is completely deleted,
            // or this is the last table that indexes it. Deleting the source
            // object while an earlier table still needs it for a rewrite
            // would make that rewrite fail on a missing object.
            if surviving.is_empty() || entry.chunk_ref.through <= table_interval.end {
                marker.put(entry.chunk_ref.chunk_id.as_bytes())?;
            }
            return Ok(true);
        }

        // Not expired. A chunk extending past this table's end is also
        // indexed by a later table; the policy may let this table drop its
        // entry without touching storage. The chunk was not marked for
        // deletion, so the table does not count as empty.
        if entry.chunk_ref.through > table_interval.end
            && expiration.drop_from_index(&entry, table_interval.end, now)
        {
            empty = false;
            modified = true;
            return Ok(true);
        }

        empty = false;
        series_map.mark_series_not_deleted(&entry.chunk_ref.series_id, &entry.chunk_ref.user_id);
        Ok(false)
    })?;

    if !chunks_found {
        return Err(RetentionError::NoChunksFound);
    }
    if empty {
        return Ok((true, true));
    }
    cancel.check()?;

    series_map.for_each(&mut |info| {
        if !info.is_deleted {
            return Ok(());
        }
        index.cleanup_series(&info.user_id, &info.labels)
    })?;

    Ok((false, modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::types::{Chunk, ChunkEntry, IntervalFilter, Labels, LogEntry};
    use crate::chunk::{ChunkKey, FilesystemChunkClient};
    use crate::index::MemoryTableIndex;
    use crate::retention::marker::{markers_dir, MarkerProcessor};
    use std::collections::HashMap;
    use tempfile::{tempdir, TempDir};

    /// Scripted expiration policy keyed by chunk id
    #[derive(Default)]
    struct FakeChecker {
        expired: HashMap<String, Vec<IntervalFilter>>,
        drop_from_index: bool,
    }

    impl FakeChecker {
        fn expire(mut self, chunk_id: &str, surviving: Vec<IntervalFilter>) -> Self {
            self.expired.insert(chunk_id.to_string(), surviving);
            self
        }

        fn dropping(mut self) -> Self {
            self.drop_from_index = true;
            self
        }
    }

    impl ExpirationChecker for FakeChecker {
        fn expired(&self, entry: &ChunkEntry, _now: i64) -> (bool, Vec<IntervalFilter>) {
            match self.expired.get(&entry.chunk_ref.chunk_id) {
                Some(surviving) => (true, surviving.clone()),
                None => (false, Vec::new()),
            }
        }

        fn drop_from_index(&self, _entry: &ChunkEntry, _table_end: i64, _now: i64) -> bool {
            self.drop_from_index
        }
    }

    struct Fixture {
        dir: TempDir,
        client: Arc<FilesystemChunkClient>,
        index: MemoryTableIndex,
    }

    impl Fixture {
        /// Table `index_0` with period 200ms covers [0, 199]
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let client =
                Arc::new(FilesystemChunkClient::new(dir.path().join("chunks")).unwrap());
            let index = MemoryTableIndex::new("index_0", TimeInterval::new(0, 199));
            Self { dir, client, index }
        }

        /// Store a chunk and index it, returning its external key
        fn seed_chunk(&mut self, user: &str, app: &str, from: i64, through: i64) -> String {
            let labels = Labels::new().label("app", app);
            let fp = labels.fingerprint();
            let entries = (from..=through)
                .step_by(10)
                .map(|ts| LogEntry::new(ts, format!("line at {}", ts)))
                .collect();
            let chunk = Chunk::new(user, fp, labels.clone(), from, through, entries);
            self.client.put_chunks(std::slice::from_ref(&chunk)).unwrap();

            let chunk_id = chunk.external_key();
            self.index
                .add_chunk(user, labels, chunk_id.clone(), from, through);
            chunk_id
        }

        fn marker(&self, checker: FakeChecker) -> TableMarker {
            TableMarker::new(
                self.dir.path().join("retention"),
                TableSchema::new("index_", 200),
                Arc::new(checker),
                self.client.clone() as Arc<dyn ChunkStore>,
            )
        }

        fn marked_chunk_ids(&self) -> Vec<String> {
            let dir = markers_dir(&self.dir.path().join("retention"));
            let mut ids = Vec::new();
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    for mark in MarkerProcessor::read_marks(&entry.path()).unwrap() {
                        ids.push(String::from_utf8(mark).unwrap());
                    }
                }
            }
            ids.sort();
            ids
        }
    }

    #[test]
    fn test_full_expiration_of_one_chunk() {
        let mut fx = Fixture::new();
        let chunk_id = fx.seed_chunk("t1", "api", 0, 100);
        let marker = fx.marker(FakeChecker::default().expire(&chunk_id, Vec::new()));

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(empty);
        assert!(modified);
        assert_eq!(fx.marked_chunk_ids(), vec![chunk_id]);
        assert!(fx.index.is_empty());
        // The whole table is dropped by the caller, so no series cleanup ran
        assert_eq!(fx.index.series_count(), 1);
        assert_eq!(marker.metrics().snapshot().tables_deleted, 1);
        assert_eq!(marker.metrics().snapshot().marks_created, 1);
    }

    #[test]
    fn test_noop_scan() {
        let mut fx = Fixture::new();
        fx.seed_chunk("t1", "api", 0, 100);
        let marker = fx.marker(FakeChecker::default());

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(!empty);
        assert!(!modified);
        assert!(fx.marked_chunk_ids().is_empty());
        assert_eq!(fx.index.chunk_count(), 1);
        assert_eq!(fx.index.series_count(), 1);
        assert_eq!(marker.metrics().snapshot().tables_unchanged, 1);
    }

    #[test]
    fn test_partial_expiration_single_table() {
        let mut fx = Fixture::new();
        let chunk_id = fx.seed_chunk("t1", "api", 0, 100);
        let marker = fx.marker(FakeChecker::default().expire(
            &chunk_id,
            vec![IntervalFilter::new(TimeInterval::new(50, 100))],
        ));

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(!empty);
        assert!(modified);
        // Last (only) table indexing the chunk: the source is marked
        assert_eq!(fx.marked_chunk_ids(), vec![chunk_id]);

        // The replacement chunk keeps the series alive
        assert_eq!(fx.index.chunk_count(), 1);
        assert!(fx.index.has_series("t1", &Labels::new().label("app", "api")));

        let labels = Labels::new().label("app", "api");
        let replacement = ChunkKey::new("t1", labels.fingerprint(), 50, 100);
        assert!(fx.client.contains(&replacement.external()));
    }

    #[test]
    fn test_partial_expiration_spanning_into_later_table() {
        let mut fx = Fixture::new();
        // through=300 > table end 199: a later table also indexes this chunk
        let chunk_id = fx.seed_chunk("t1", "api", 0, 300);
        let marker = fx.marker(FakeChecker::default().expire(
            &chunk_id,
            vec![IntervalFilter::new(TimeInterval::new(50, 100))],
        ));

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(!empty);
        assert!(modified);
        // Delay-until-last-table: no mark, source object stays
        assert!(fx.marked_chunk_ids().is_empty());
        assert!(fx.client.contains(&chunk_id));
        // Index entry for the source is gone, replacement is indexed
        assert_eq!(fx.index.chunk_count(), 1);
    }

    #[test]
    fn test_aging_out_of_this_table() {
        let mut fx = Fixture::new();
        let chunk_id = fx.seed_chunk("t1", "api", 150, 300);
        let marker = fx.marker(FakeChecker::default().dropping());

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(!empty);
        assert!(modified);
        assert!(fx.marked_chunk_ids().is_empty());
        assert!(fx.index.is_empty());
        assert!(fx.client.contains(&chunk_id));
    }

    #[test]
    fn test_series_cleanup_only_for_fully_deleted_series() {
        let mut fx = Fixture::new();
        let doomed = fx.seed_chunk("t1", "api", 0, 100);
        fx.seed_chunk("t1", "db", 0, 100);
        let marker = fx.marker(FakeChecker::default().expire(&doomed, Vec::new()));

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(!empty);
        assert!(modified);
        assert!(!fx.index.has_series("t1", &Labels::new().label("app", "api")));
        assert!(fx.index.has_series("t1", &Labels::new().label("app", "db")));
    }

    #[test]
    fn test_empty_table_is_a_distinct_error() {
        let mut fx = Fixture::new();
        let marker = fx.marker(FakeChecker::default());

        let err = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap_err();

        assert!(matches!(err, RetentionError::NoChunksFound));
        assert!(fx.marked_chunk_ids().is_empty());
        assert_eq!(marker.metrics().snapshot().tables_failed, 1);
    }

    #[test]
    fn test_cancellation_before_scan() {
        let mut fx = Fixture::new();
        fx.seed_chunk("t1", "api", 0, 100);
        let marker = fx.marker(FakeChecker::default());

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = marker
            .mark_for_delete(&cancel, "index_0", "t1", &mut fx.index)
            .unwrap_err();

        assert!(matches!(err, RetentionError::Cancelled));
        assert_eq!(fx.index.chunk_count(), 1);
    }

    #[test]
    fn test_every_chunk_lands_exactly_one_outcome() {
        // Property: each entry ends up unchanged, dropped+marked, or
        // dropped without a mark
        let mut fx = Fixture::new();
        let kept = fx.seed_chunk("t1", "api", 0, 100);
        let fully_expired = fx.seed_chunk("t1", "db", 0, 120);
        let spanning = fx.seed_chunk("t1", "cache", 100, 300);

        let marker = fx.marker(
            FakeChecker::default()
                .expire(&fully_expired, Vec::new())
                .expire(
                    &spanning,
                    vec![IntervalFilter::new(TimeInterval::new(150, 300))],
                ),
        );

        let (empty, modified) = marker
            .mark_for_delete(&CancelFlag::new(), "index_0", "t1", &mut fx.index)
            .unwrap();

        assert!(!empty);
        assert!(modified);
        // Only the fully expired chunk is marked; the spanning chunk waits
        // for its last table
        assert_eq!(fx.marked_chunk_ids(), vec![fully_expired]);

        let remaining = fx.index.chunk_ids();
        // The kept chunk plus the [150, 199]-overlapping replacement
        assert!(remaining.contains(&kept));
        assert_eq!(remaining.len(), 2);
    }
}
