//! Scan-scoped series tracking
//!
//! While marking a table, the marker records every series it encounters and
//! whether any of its chunks survived. A series whose flag is still set at
//! the end of the scan has lost every chunk and its metadata can be dropped
//! from the index.

use crate::chunk::types::Labels;
use crate::error::RetentionResult;
use std::collections::HashMap;

/// Per-series state observed during one table scan
#[derive(Debug, Clone)]
pub struct UserSeriesInfo {
    pub user_id: String,
    pub series_id: Vec<u8>,
    pub labels: Labels,
    /// Starts true on first observation; cleared the first time a surviving
    /// chunk for this series is seen
    pub is_deleted: bool,
}

/// Map of `(user, series)` to scan state. Single-threaded, scan-scoped.
#[derive(Debug, Default)]
pub struct UserSeriesMap {
    map: HashMap<(String, Vec<u8>), UserSeriesInfo>,
}

impl UserSeriesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a series observation. Idempotent: the first label set seen is
    /// retained and the deleted flag is left untouched on re-adds.
    pub fn add(&mut self, series_id: &[u8], user_id: &str, labels: &Labels) {
        let key = (user_id.to_string(), series_id.to_vec());
        self.map.entry(key).or_insert_with(|| UserSeriesInfo {
            user_id: user_id.to_string(),
            series_id: series_id.to_vec(),
            labels: labels.clone(),
            is_deleted: true,
        });
    }

    /// Mark a series as having at least one surviving chunk
    pub fn mark_series_not_deleted(&mut self, series_id: &[u8], user_id: &str) {
        let key = (user_id.to_string(), series_id.to_vec());
        if let Some(info) = self.map.get_mut(&key) {
            info.is_deleted = false;
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate all observed series in unspecified order; the first callback
    /// error aborts iteration.
    pub fn for_each(
        &self,
        cb: &mut dyn FnMut(&UserSeriesInfo) -> RetentionResult<()>,
    ) -> RetentionResult<()> {
        for info in self.map.values() {
            cb(info)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetentionError;

    fn labels(app: &str) -> Labels {
        Labels::new().label("app", app)
    }

    #[test]
    fn test_add_is_idempotent_and_keeps_first_labels() {
        let mut map = UserSeriesMap::new();
        map.add(b"s1", "t1", &labels("first"));
        map.add(b"s1", "t1", &labels("second"));

        assert_eq!(map.len(), 1);
        map.for_each(&mut |info| {
            assert_eq!(info.labels.get("app"), Some("first"));
            assert!(info.is_deleted);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_not_deleted_survives_re_add() {
        let mut map = UserSeriesMap::new();
        map.add(b"s1", "t1", &labels("api"));
        map.mark_series_not_deleted(b"s1", "t1");
        map.add(b"s1", "t1", &labels("api"));

        map.for_each(&mut |info| {
            assert!(!info.is_deleted);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_same_series_id_different_users() {
        let mut map = UserSeriesMap::new();
        map.add(b"s1", "t1", &labels("api"));
        map.add(b"s1", "t2", &labels("api"));
        map.mark_series_not_deleted(b"s1", "t1");

        assert_eq!(map.len(), 2);
        let mut deleted = Vec::new();
        map.for_each(&mut |info| {
            if info.is_deleted {
                deleted.push(info.user_id.clone());
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(deleted, vec!["t2".to_string()]);
    }

    #[test]
    fn test_for_each_aborts_on_first_error() {
        let mut map = UserSeriesMap::new();
        map.add(b"s1", "t1", &labels("a"));
        map.add(b"s2", "t1", &labels("b"));

        let mut calls = 0;
        let result = map.for_each(&mut |_| {
            calls += 1;
            Err(RetentionError::Index("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
