//! Chunk blob codec
//!
//! Chunks are immutable blobs of log entries. The blob is self-describing:
//! it carries the label set and the inclusive time bounds alongside the
//! entries, so a fetched chunk can be re-indexed and rewritten without any
//! out-of-band metadata.
//!
//! Layout:
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ magic: [u8; 4] = "TMCK"                      │
//! │ version: u16                                 │
//! │ payload: LZ4(bincode(EncodedChunk))          │
//! │ crc: u32 (CRC32 of magic + version + payload)│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are delta-encoded before serialization; log lines compress
//! well under LZ4 since adjacent lines share most of their structure.

use crate::chunk::types::{Chunk, Labels, LineFilter, LogEntry};
use crate::error::{RetentionError, RetentionResult};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying a chunk blob
const CHUNK_MAGIC: [u8; 4] = *b"TMCK";

/// Current chunk format version
const CHUNK_VERSION: u16 = 1;

/// Minimum size of a valid blob: magic + version + crc
const MIN_BLOB_SIZE: usize = 10;

/// Intermediate format for delta-encoded chunk contents
#[derive(Debug, Serialize, Deserialize)]
struct EncodedChunk {
    /// Label set of the series
    labels: Labels,
    /// Inclusive lower time bound, milliseconds
    from: i64,
    /// Inclusive upper time bound, milliseconds
    through: i64,
    /// Base timestamp (first entry's timestamp)
    base_timestamp: i64,
    /// Delta-encoded timestamps (differences from previous)
    timestamp_deltas: Vec<i64>,
    /// Log lines, one per entry
    lines: Vec<String>,
}

/// Encode a chunk into its storage blob
pub fn encode_chunk(chunk: &Chunk) -> RetentionResult<Vec<u8>> {
    // Sort by timestamp before delta encoding
    let mut sorted: Vec<&LogEntry> = chunk.entries.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    let base_timestamp = sorted.first().map(|e| e.timestamp).unwrap_or(0);
    let mut timestamp_deltas = Vec::with_capacity(sorted.len());
    let mut prev_ts = base_timestamp;
    for entry in &sorted {
        timestamp_deltas.push(entry.timestamp - prev_ts);
        prev_ts = entry.timestamp;
    }

    let encoded = EncodedChunk {
        labels: chunk.labels.clone(),
        from: chunk.from,
        through: chunk.through,
        base_timestamp,
        timestamp_deltas,
        lines: sorted.iter().map(|e| e.line.clone()).collect(),
    };

    let serialized = bincode::serialize(&encoded)?;
    let payload = lz4_flex::compress_prepend_size(&serialized);

    let mut blob = Vec::with_capacity(payload.len() + MIN_BLOB_SIZE);
    blob.extend_from_slice(&CHUNK_MAGIC);
    blob.extend_from_slice(&CHUNK_VERSION.to_le_bytes());
    blob.extend_from_slice(&payload);

    let crc = crc32fast::hash(&blob);
    blob.extend_from_slice(&crc.to_le_bytes());

    Ok(blob)
}

/// Decode a storage blob back into a chunk owned by `user_id`
pub fn decode_chunk(user_id: &str, blob: &[u8]) -> RetentionResult<Chunk> {
    if blob.len() < MIN_BLOB_SIZE {
        return Err(RetentionError::Corruption(format!(
            "Chunk blob too short: {} bytes",
            blob.len()
        )));
    }

    let (body, crc_bytes) = blob.split_at(blob.len() - 4);
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed_crc = crc32fast::hash(body);
    if stored_crc != computed_crc {
        return Err(RetentionError::Corruption(format!(
            "Chunk checksum mismatch: stored={}, computed={}",
            stored_crc, computed_crc
        )));
    }

    if body[0..4] != CHUNK_MAGIC {
        return Err(RetentionError::Corruption(format!(
            "Invalid chunk magic: {:?}",
            &body[0..4]
        )));
    }

    let version = u16::from_le_bytes([body[4], body[5]]);
    if version > CHUNK_VERSION {
        return Err(RetentionError::Corruption(format!(
            "Unsupported chunk version: {}",
            version
        )));
    }

    let serialized = lz4_flex::decompress_size_prepended(&body[6..])
        .map_err(|e| RetentionError::Compression(format!("LZ4 decompression failed: {}", e)))?;
    let encoded: EncodedChunk = bincode::deserialize(&serialized)?;

    let mut entries = Vec::with_capacity(encoded.timestamp_deltas.len());
    let mut current_ts = encoded.base_timestamp;
    for (i, delta) in encoded.timestamp_deltas.iter().enumerate() {
        current_ts += delta;
        let line = encoded.lines.get(i).cloned().unwrap_or_default();
        entries.push(LogEntry::new(current_ts, line));
    }

    let fingerprint = encoded.labels.fingerprint();
    Ok(Chunk::new(
        user_id,
        fingerprint,
        encoded.labels,
        encoded.from,
        encoded.through,
        entries,
    ))
}

/// Slice entries to the inclusive sub-interval `[start, end]`, dropping rows
/// the filter rejects.
///
/// Returns `NoDataInRange` when nothing survives; callers skip the interval
/// in that case.
pub fn rebound(
    entries: &[LogEntry],
    start: i64,
    end: i64,
    filter: Option<&LineFilter>,
) -> RetentionResult<Vec<LogEntry>> {
    let surviving: Vec<LogEntry> = entries
        .iter()
        .filter(|e| e.timestamp >= start && e.timestamp <= end)
        .filter(|e| match filter {
            Some(f) => !f(e.timestamp, &e.line),
            None => true,
        })
        .cloned()
        .collect();

    if surviving.is_empty() {
        return Err(RetentionError::NoDataInRange);
    }
    Ok(surviving)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_chunk() -> Chunk {
        let labels = Labels::new().label("app", "api").label("env", "prod");
        let fp = labels.fingerprint();
        let entries = (0..100)
            .map(|i| LogEntry::new(1000 + i * 50, format!("level=info msg=\"req {}\"", i)))
            .collect();
        Chunk::new("t1", fp, labels, 1000, 1000 + 99 * 50, entries)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let chunk = sample_chunk();
        let blob = encode_chunk(&chunk).unwrap();
        let decoded = decode_chunk("t1", &blob).unwrap();

        assert_eq!(decoded, chunk);
        assert_eq!(decoded.external_key(), chunk.external_key());
    }

    #[test]
    fn test_encode_sorts_entries() {
        let labels = Labels::new().label("app", "api");
        let fp = labels.fingerprint();
        let entries = vec![
            LogEntry::new(3000, "c"),
            LogEntry::new(1000, "a"),
            LogEntry::new(2000, "b"),
        ];
        let chunk = Chunk::new("t1", fp, labels, 1000, 3000, entries);

        let decoded = decode_chunk("t1", &encode_chunk(&chunk).unwrap()).unwrap();
        let timestamps: Vec<i64> = decoded.entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_decode_detects_corruption() {
        let blob = encode_chunk(&sample_chunk()).unwrap();

        let mut corrupted = blob.clone();
        let mid = corrupted.len() / 2;
        corrupted[mid] ^= 0xff;
        assert!(matches!(
            decode_chunk("t1", &corrupted),
            Err(RetentionError::Corruption(_))
        ));

        assert!(decode_chunk("t1", &blob[..5]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut blob = encode_chunk(&sample_chunk()).unwrap();
        blob[0..4].copy_from_slice(b"XXXX");
        // Fix up the checksum so the magic check is what fails
        let body_len = blob.len() - 4;
        let crc = crc32fast::hash(&blob[..body_len]);
        blob[body_len..].copy_from_slice(&crc.to_le_bytes());

        match decode_chunk("t1", &blob) {
            Err(RetentionError::Corruption(msg)) => assert!(msg.contains("magic")),
            other => panic!("expected corruption error, got {:?}", other),
        }
    }

    #[test]
    fn test_rebound_inclusive_bounds() {
        let chunk = sample_chunk();
        let entries = rebound(&chunk.entries, 1000, 1100, None).unwrap();
        let timestamps: Vec<i64> = entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 1050, 1100]);
    }

    #[test]
    fn test_rebound_applies_filter() {
        let entries = vec![
            LogEntry::new(1000, "keep me"),
            LogEntry::new(1100, "drop me"),
            LogEntry::new(1200, "keep me too"),
        ];
        let filter: LineFilter = Arc::new(|_, line| line.contains("drop"));
        let surviving = rebound(&entries, 0, 2000, Some(&filter)).unwrap();

        assert_eq!(surviving.len(), 2);
        assert!(surviving.iter().all(|e| !e.line.contains("drop")));
    }

    #[test]
    fn test_rebound_empty_range_is_distinct_error() {
        let chunk = sample_chunk();
        assert!(matches!(
            rebound(&chunk.entries, 100_000, 200_000, None),
            Err(RetentionError::NoDataInRange)
        ));

        // A filter that rejects everything also leaves an empty chunk
        let filter: LineFilter = Arc::new(|_, _| true);
        assert!(matches!(
            rebound(&chunk.entries, 0, i64::MAX, Some(&filter)),
            Err(RetentionError::NoDataInRange)
        ));
    }
}
