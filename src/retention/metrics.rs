//! Retention counters
//!
//! Plain atomic counters with snapshot views. The embedding service decides
//! how to export them; the engine only records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome of processing one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAction {
    /// Every chunk was marked; the caller may drop the table
    Deleted,
    /// Index or chunk store was changed
    Modified,
    /// Clean no-op
    None,
    /// The scan errored out
    Failure,
}

/// Counters published by the table marker
#[derive(Debug, Default)]
pub struct MarkerMetrics {
    tables_deleted: AtomicU64,
    tables_modified: AtomicU64,
    tables_unchanged: AtomicU64,
    tables_failed: AtomicU64,
    marks_created: AtomicU64,
}

impl MarkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_table(&self, action: TableAction) {
        let counter = match action {
            TableAction::Deleted => &self.tables_deleted,
            TableAction::Modified => &self.tables_modified,
            TableAction::None => &self.tables_unchanged,
            TableAction::Failure => &self.tables_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_marks(&self, count: u64) {
        self.marks_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MarkerMetricsSnapshot {
        MarkerMetricsSnapshot {
            tables_deleted: self.tables_deleted.load(Ordering::Relaxed),
            tables_modified: self.tables_modified.load(Ordering::Relaxed),
            tables_unchanged: self.tables_unchanged.load(Ordering::Relaxed),
            tables_failed: self.tables_failed.load(Ordering::Relaxed),
            marks_created: self.marks_created.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`MarkerMetrics`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMetricsSnapshot {
    pub tables_deleted: u64,
    pub tables_modified: u64,
    pub tables_unchanged: u64,
    pub tables_failed: u64,
    pub marks_created: u64,
}

impl std::fmt::Display for MarkerMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tables: {} deleted, {} modified, {} unchanged, {} failed; Marks: {}",
            self.tables_deleted,
            self.tables_modified,
            self.tables_unchanged,
            self.tables_failed,
            self.marks_created
        )
    }
}

/// Outcome of one chunk delete attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Success,
    NotFound,
    Failure,
}

/// Counters published by the sweeper
#[derive(Debug, Default)]
pub struct SweeperMetrics {
    deletes_succeeded: AtomicU64,
    deletes_not_found: AtomicU64,
    deletes_failed: AtomicU64,
    delete_millis_total: AtomicU64,
    logs_processed: AtomicU64,
    logs_removed: AtomicU64,
}

impl SweeperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delete(&self, status: DeleteStatus, elapsed: Duration) {
        let counter = match status {
            DeleteStatus::Success => &self.deletes_succeeded,
            DeleteStatus::NotFound => &self.deletes_not_found,
            DeleteStatus::Failure => &self.deletes_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.delete_millis_total
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_log_processed(&self) {
        self.logs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_removed(&self) {
        self.logs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SweeperMetricsSnapshot {
        SweeperMetricsSnapshot {
            deletes_succeeded: self.deletes_succeeded.load(Ordering::Relaxed),
            deletes_not_found: self.deletes_not_found.load(Ordering::Relaxed),
            deletes_failed: self.deletes_failed.load(Ordering::Relaxed),
            delete_millis_total: self.delete_millis_total.load(Ordering::Relaxed),
            logs_processed: self.logs_processed.load(Ordering::Relaxed),
            logs_removed: self.logs_removed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`SweeperMetrics`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperMetricsSnapshot {
    pub deletes_succeeded: u64,
    pub deletes_not_found: u64,
    pub deletes_failed: u64,
    pub delete_millis_total: u64,
    pub logs_processed: u64,
    pub logs_removed: u64,
}

impl std::fmt::Display for SweeperMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Deletes: {} ok, {} not found, {} failed ({} ms total); Logs: {} processed, {} removed",
            self.deletes_succeeded,
            self.deletes_not_found,
            self.deletes_failed,
            self.delete_millis_total,
            self.logs_processed,
            self.logs_removed
        )
    }
}
