//! Core data types for chunk storage and retention
//!
//! This module defines the types shared by the chunk codec, the object store
//! client and the retention pipeline:
//! - `LogEntry`: a single timestamped log line
//! - `Labels`: the label set identifying a series within a tenant
//! - `ChunkRef` / `ChunkEntry`: index-level references to stored chunks
//! - `ChunkKey`: the external key addressing a chunk object
//! - `TimeInterval` / `IntervalFilter`: inclusive intervals and row filters

use crate::error::{RetentionError, RetentionResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single log line with its timestamp in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// The log line content
    pub line: String,
}

impl LogEntry {
    pub fn new(timestamp: i64, line: impl Into<String>) -> Self {
        Self {
            timestamp,
            line: line.into(),
        }
    }
}

/// Label set identifying a series within a tenant
///
/// Labels are kept sorted by key so that equality, serialization and the
/// fingerprint are independent of insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a label set from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builder method: add a label
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stable 64-bit fingerprint of the label set.
    ///
    /// Deterministic across processes and runs: it feeds the external chunk
    /// key, so a rewrite of the same series must always derive the same
    /// fingerprint.
    pub fn fingerprint(&self) -> u64 {
        let mut hi = crc32fast::Hasher::new();
        let mut lo = crc32fast::Hasher::new_with_initial(0x5eed_cafe);
        for (k, v) in &self.0 {
            hi.update(k.as_bytes());
            hi.update(&[0xff]);
            hi.update(v.as_bytes());
            hi.update(&[0xfe]);
            lo.update(v.as_bytes());
            lo.update(&[0xfd]);
            lo.update(k.as_bytes());
            lo.update(&[0xfc]);
        }
        ((hi.finalize() as u64) << 32) | lo.finalize() as u64
    }
}

impl std::fmt::Display for Labels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Inclusive time interval `[start, end]` in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    /// Start timestamp (inclusive), in milliseconds
    pub start: i64,
    /// End timestamp (inclusive), in milliseconds
    pub end: i64,
}

impl TimeInterval {
    /// Create a new interval
    ///
    /// # Panics
    /// Panics if start > end
    pub fn new(start: i64, end: i64) -> Self {
        assert!(start <= end, "TimeInterval: start must not exceed end");
        Self { start, end }
    }

    /// Check if a timestamp falls within this interval
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Check if this interval overlaps with another
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Get intersection with another interval, if any
    pub fn intersection(&self, other: &TimeInterval) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }
}

/// Row-level predicate applied during rewrite.
///
/// Returns true if the line must be removed from the replacement chunk.
pub type LineFilter = Arc<dyn Fn(i64, &str) -> bool + Send + Sync>;

/// A sub-interval of a source chunk that must survive a rewrite, plus an
/// optional row filter applied while slicing.
#[derive(Clone)]
pub struct IntervalFilter {
    pub interval: TimeInterval,
    pub filter: Option<LineFilter>,
}

impl IntervalFilter {
    pub fn new(interval: TimeInterval) -> Self {
        Self {
            interval,
            filter: None,
        }
    }

    pub fn with_filter(interval: TimeInterval, filter: LineFilter) -> Self {
        Self {
            interval,
            filter: Some(filter),
        }
    }
}

impl std::fmt::Debug for IntervalFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalFilter")
            .field("interval", &self.interval)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Index-level reference to a stored chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Opaque tenant identifier
    pub user_id: String,
    /// Opaque series identifier, stable across chunks of the same label set
    pub series_id: Vec<u8>,
    /// External key addressing the object store; starts with `<user_id>/`
    pub chunk_id: String,
    /// Inclusive lower time bound, milliseconds
    pub from: i64,
    /// Inclusive upper time bound, milliseconds
    pub through: i64,
}

impl std::fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UserID: {} , SeriesID: {} , Time: [{},{}]",
            self.user_id,
            String::from_utf8_lossy(&self.series_id),
            self.from,
            self.through
        )
    }
}

/// A `ChunkRef` enriched with the decoded label set of its series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub chunk_ref: ChunkRef,
    pub labels: Labels,
}

/// Parsed external chunk key: `<user>/<fingerprint:016x>:<from:x>:<through:x>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    pub user_id: String,
    pub fingerprint: u64,
    pub from: i64,
    pub through: i64,
}

impl ChunkKey {
    pub fn new(user_id: impl Into<String>, fingerprint: u64, from: i64, through: i64) -> Self {
        Self {
            user_id: user_id.into(),
            fingerprint,
            from,
            through,
        }
    }

    /// Textual external form of this key
    pub fn external(&self) -> String {
        format!(
            "{}/{:016x}:{:x}:{:x}",
            self.user_id, self.fingerprint, self.from, self.through
        )
    }

    /// Parse an external key, verifying it belongs to the given tenant
    pub fn parse(user_id: &str, key: &str) -> RetentionResult<Self> {
        let invalid = || RetentionError::InvalidChunkKey(key.to_string());

        let (prefix, rest) = key.split_once('/').ok_or_else(invalid)?;
        if prefix.is_empty() || prefix != user_id {
            return Err(invalid());
        }

        let mut parts = rest.split(':');
        let fingerprint = parts.next().ok_or_else(invalid)?;
        let from = parts.next().ok_or_else(invalid)?;
        let through = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let fingerprint = u64::from_str_radix(fingerprint, 16).map_err(|_| invalid())?;
        let from = i64::from_str_radix(from, 16).map_err(|_| invalid())?;
        let through = i64::from_str_radix(through, 16).map_err(|_| invalid())?;
        if from > through {
            return Err(invalid());
        }

        Ok(Self {
            user_id: user_id.to_string(),
            fingerprint,
            from,
            through,
        })
    }
}

/// Extract the tenant prefix from a chunk identifier: the bytes before the
/// first `/`, which must appear at a position > 0.
pub fn tenant_prefix(chunk_id: &[u8]) -> RetentionResult<&[u8]> {
    match chunk_id.iter().position(|&b| b == b'/') {
        Some(idx) if idx > 0 => Ok(&chunk_id[..idx]),
        _ => Err(RetentionError::InvalidChunkKey(
            String::from_utf8_lossy(chunk_id).into_owned(),
        )),
    }
}

/// A chunk: immutable blob of log entries addressed by an external key
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Owning tenant
    pub user_id: String,
    /// Series fingerprint, derived from the label set
    pub fingerprint: u64,
    /// Label set of the series
    pub labels: Labels,
    /// Inclusive lower time bound, milliseconds
    pub from: i64,
    /// Inclusive upper time bound, milliseconds
    pub through: i64,
    /// Decoded log entries, sorted by timestamp
    pub entries: Vec<LogEntry>,
}

impl Chunk {
    /// Create a chunk from entries, bounded by `[from, through]`
    pub fn new(
        user_id: impl Into<String>,
        fingerprint: u64,
        labels: Labels,
        from: i64,
        through: i64,
        entries: Vec<LogEntry>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            fingerprint,
            labels,
            from,
            through,
            entries,
        }
    }

    /// The external key addressing this chunk in the object store
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.user_id.clone(), self.fingerprint, self.from, self.through)
    }

    /// Textual external key, `<user>/<fingerprint>:<from>:<through>`
    pub fn external_key(&self) -> String {
        self.key().external()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_fingerprint_is_order_independent() {
        let a = Labels::new().label("app", "api").label("env", "prod");
        let b = Labels::new().label("env", "prod").label("app", "api");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_labels_fingerprint_distinguishes_key_value_split() {
        let a = Labels::from_pairs([("ab", "c")]);
        let b = Labels::from_pairs([("a", "bc")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_labels_display() {
        let labels = Labels::new().label("env", "prod").label("app", "api");
        assert_eq!(labels.to_string(), r#"{app="api", env="prod"}"#);
    }

    #[test]
    fn test_interval_contains_inclusive_bounds() {
        let iv = TimeInterval::new(1000, 2000);
        assert!(iv.contains(1000));
        assert!(iv.contains(2000));
        assert!(!iv.contains(999));
        assert!(!iv.contains(2001));
    }

    #[test]
    fn test_interval_overlap_and_intersection() {
        let a = TimeInterval::new(0, 100);
        let b = TimeInterval::new(100, 200);
        let c = TimeInterval::new(150, 300);

        // Inclusive bounds: touching intervals overlap
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));

        assert_eq!(a.intersection(&b), Some(TimeInterval::new(100, 100)));
        assert_eq!(a.intersection(&c), None);
        assert_eq!(b.intersection(&c), Some(TimeInterval::new(150, 200)));
    }

    #[test]
    fn test_chunk_key_roundtrip() {
        let key = ChunkKey::new("tenant-a", 0xdeadbeef, 1000, 2000);
        let external = key.external();
        assert!(external.starts_with("tenant-a/"));

        let parsed = ChunkKey::parse("tenant-a", &external).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_chunk_key_rejects_wrong_tenant() {
        let key = ChunkKey::new("tenant-a", 1, 0, 10).external();
        assert!(matches!(
            ChunkKey::parse("tenant-b", &key),
            Err(RetentionError::InvalidChunkKey(_))
        ));
    }

    #[test]
    fn test_chunk_key_rejects_malformed() {
        for bad in ["tenant-a", "/abc:0:1", "tenant-a/xyz", "tenant-a/1:2", "tenant-a/1:2:3:4"] {
            assert!(
                ChunkKey::parse("tenant-a", bad).is_err(),
                "expected parse failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_tenant_prefix() {
        assert_eq!(tenant_prefix(b"t1/chunk").unwrap(), b"t1");
        assert!(tenant_prefix(b"/chunk").is_err());
        assert!(tenant_prefix(b"no-separator").is_err());
    }

    #[test]
    fn test_chunk_external_key_is_deterministic() {
        let labels = Labels::new().label("app", "api");
        let fp = labels.fingerprint();
        let a = Chunk::new("t1", fp, labels.clone(), 50, 100, Vec::new());
        let b = Chunk::new("t1", fp, labels, 50, 100, Vec::new());
        assert_eq!(a.external_key(), b.external_key());
    }
}
