//! Mark-and-sweep retention
//!
//! Retention runs in two asynchronous phases:
//!
//! 1. **Mark**: [`TableMarker`] scans one index table at a time, asks the
//!    [`ExpirationChecker`] about every indexed chunk, rewrites partially
//!    expired chunks into smaller replacements, drops index entries, and
//!    appends the identifiers of doomed chunk objects to a durable marker
//!    log.
//! 2. **Sweep**: the [`Sweeper`] walks marker logs older than a grace
//!    window and deletes the referenced chunk objects with bounded
//!    parallelism, tolerating already-gone objects.
//!
//! ```text
//! Mark path (per table, caller thread):
//!   index entry → Expired? → rewrite survivors → drop entry → marker log
//!
//! Sweep path (background):
//!   marker log (age ≥ min_age) → worker pool → DeleteChunk → remove log
//! ```
//!
//! The two phases only communicate through marker log files, so a crash
//! between them loses nothing: marks are durable once a scan completes, and
//! re-deleting an already-gone chunk is a no-op.

pub mod expiration;
pub mod mark;
pub mod marker;
pub mod metrics;
mod rewrite;
pub mod series;
pub mod sweep;

pub use expiration::{ExpirationChecker, PeriodExpirationChecker};
pub use mark::TableMarker;
pub use marker::{MarkerProcessor, MarkerWriter};
pub use metrics::{DeleteStatus, MarkerMetrics, SweeperMetrics, TableAction};
pub use series::{UserSeriesInfo, UserSeriesMap};
pub use sweep::Sweeper;

use crate::error::{RetentionError, RetentionResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle.
///
/// Cloneable; all clones observe the same flag. The table marker checks it
/// before opening the marker log, before each chunk, and at scan
/// completion; sweeper workers check it before each delete.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight operations finish their current unit.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Error out if cancellation was requested
    pub fn check(&self) -> RetentionResult<()> {
        if self.is_cancelled() {
            Err(RetentionError::Cancelled)
        } else {
            Ok(())
        }
    }
}
