//! Expiration policy boundary
//!
//! The retention core makes two distinct queries against the policy: whole
//! chunk expiration (with optional surviving sub-intervals) and per-table
//! index drop for chunks that are also indexed by a later table. The two
//! must not be conflated: the first decides the fate of the chunk object,
//! the second only trims this table's view of it.

use crate::chunk::types::{ChunkEntry, IntervalFilter};
use chrono::Duration;
use std::collections::HashMap;

/// Policy queries consumed by the table marker
pub trait ExpirationChecker: Send + Sync {
    /// Is the chunk expired at `now`? When partially expired, the returned
    /// intervals are the pairwise-disjoint sub-ranges of
    /// `[from, through]` that must survive as replacement chunks.
    fn expired(&self, entry: &ChunkEntry, now: i64) -> (bool, Vec<IntervalFilter>);

    /// May this table drop its index entry for a chunk that extends past
    /// `table_end` into a later table?
    fn drop_from_index(&self, entry: &ChunkEntry, table_end: i64, now: i64) -> bool;
}

/// Whole-chunk expiration by per-tenant retention periods.
///
/// A chunk is expired once its entire interval has aged out; this checker
/// never yields surviving intervals. Row-level deletion policies are
/// provided by external checkers.
pub struct PeriodExpirationChecker {
    default_period_millis: i64,
    per_user_millis: HashMap<String, i64>,
}

impl PeriodExpirationChecker {
    pub fn new(default_period: Duration) -> Self {
        Self {
            default_period_millis: default_period.num_milliseconds(),
            per_user_millis: HashMap::new(),
        }
    }

    /// Builder: override the retention period for one tenant
    pub fn with_user_period(mut self, user_id: impl Into<String>, period: Duration) -> Self {
        self.per_user_millis
            .insert(user_id.into(), period.num_milliseconds());
        self
    }

    fn period_for(&self, user_id: &str) -> i64 {
        self.per_user_millis
            .get(user_id)
            .copied()
            .unwrap_or(self.default_period_millis)
    }
}

impl ExpirationChecker for PeriodExpirationChecker {
    fn expired(&self, entry: &ChunkEntry, now: i64) -> (bool, Vec<IntervalFilter>) {
        let period = self.period_for(&entry.chunk_ref.user_id);
        (now - entry.chunk_ref.through > period, Vec::new())
    }

    fn drop_from_index(&self, entry: &ChunkEntry, table_end: i64, now: i64) -> bool {
        let period = self.period_for(&entry.chunk_ref.user_id);
        now - table_end > period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::types::{ChunkRef, Labels};

    fn entry(user: &str, from: i64, through: i64) -> ChunkEntry {
        ChunkEntry {
            chunk_ref: ChunkRef {
                user_id: user.to_string(),
                series_id: b"series".to_vec(),
                chunk_id: format!("{}/chunk", user),
                from,
                through,
            },
            labels: Labels::new().label("app", "api"),
        }
    }

    #[test]
    fn test_whole_chunk_expiry() {
        let checker = PeriodExpirationChecker::new(Duration::milliseconds(1000));
        let now = 10_000;

        // through 8999: aged out by 1001ms > period
        let (expired, surviving) = checker.expired(&entry("t1", 8000, 8999), now);
        assert!(expired);
        assert!(surviving.is_empty());

        // through 9000: exactly at the boundary, not yet expired
        let (expired, _) = checker.expired(&entry("t1", 8000, 9000), now);
        assert!(!expired);
    }

    #[test]
    fn test_per_user_override() {
        let checker = PeriodExpirationChecker::new(Duration::milliseconds(1000))
            .with_user_period("short", Duration::milliseconds(10));
        let now = 10_000;

        let (expired, _) = checker.expired(&entry("short", 9000, 9500), now);
        assert!(expired);
        let (expired, _) = checker.expired(&entry("t1", 9000, 9500), now);
        assert!(!expired);
    }

    #[test]
    fn test_drop_from_index_uses_table_end() {
        let checker = PeriodExpirationChecker::new(Duration::milliseconds(1000));
        let now = 10_000;
        let e = entry("t1", 8000, 12_000);

        // Table ends long before the cutoff: this table's entry can go
        assert!(checker.drop_from_index(&e, 8500, now));
        // Table end within retention: keep the entry
        assert!(!checker.drop_from_index(&e, 9500, now));
    }
}
