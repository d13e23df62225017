//! Durable marker logs
//!
//! Each table scan appends the chunk identifiers it marked for deletion to
//! its own marker log under `<working_dir>/markers/`. The log becomes
//! visible to the sweeper only on close: the writer writes to a `.tmp`
//! sibling, fsyncs, and renames, so the reader never observes a log that is
//! still being written. A scan that marked nothing publishes no log.
//!
//! Format per record:
//! - length: u32 (4 bytes)
//! - data: [u8; length] (chunk identifier)
//! - crc: u32 (4 bytes, CRC32 of length + data)
//!
//! Logs are processed once their modification time is at least `min_age`
//! old; the grace window must exceed the longest in-flight read that might
//! still hold a stale chunk reference.

use crate::error::{RetentionError, RetentionResult};
use crate::retention::metrics::SweeperMetrics;
use crate::retention::CancelFlag;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Subdirectory of the working directory holding marker logs
pub const MARKERS_FOLDER: &str = "markers";

/// Suffix of logs still being written
const TMP_SUFFIX: &str = "tmp";

/// Sanity limit on a single chunk identifier record
const MAX_RECORD_LEN: usize = 1_000_000;

/// Process-wide sequence to keep log names unique within one millisecond
static WRITER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Resolve the markers directory under a working directory
pub fn markers_dir(working_dir: &Path) -> PathBuf {
    working_dir.join(MARKERS_FOLDER)
}

/// Append-only writer for one table scan's marker log
pub struct MarkerWriter {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    count: u64,
}

impl MarkerWriter {
    /// Open a fresh marker log under `working_dir`
    pub fn new(working_dir: &Path) -> RetentionResult<Self> {
        let dir = markers_dir(working_dir);
        std::fs::create_dir_all(&dir)?;

        let seq = WRITER_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{:06}", Utc::now().timestamp_millis(), seq % 1_000_000);
        let final_path = dir.join(&name);
        let tmp_path = dir.join(format!("{}.{}", name, TMP_SUFFIX));

        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            tmp_path,
            final_path,
            count: 0,
        })
    }

    /// Append a chunk identifier
    pub fn put(&mut self, chunk_id: &[u8]) -> RetentionResult<()> {
        let len = chunk_id.len() as u32;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len.to_le_bytes());
        hasher.update(chunk_id);
        let crc = hasher.finalize();

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(chunk_id)?;
        self.writer.write_all(&crc.to_le_bytes())?;

        self.count += 1;
        Ok(())
    }

    /// Number of identifiers appended so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Durably publish the log. With zero marks the temp file is removed
    /// and nothing is published.
    pub fn close(mut self) -> RetentionResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        drop(self.writer);

        if self.count == 0 {
            std::fs::remove_file(&self.tmp_path)?;
            return Ok(());
        }

        std::fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(())
    }
}

/// Reader side: discovers aged marker logs and drives identifiers through a
/// bounded worker pool
pub struct MarkerProcessor {
    dir: PathBuf,
    min_age: chrono::Duration,
    worker_count: usize,
    metrics: Arc<SweeperMetrics>,
}

impl MarkerProcessor {
    pub fn new(
        working_dir: &Path,
        min_age: chrono::Duration,
        worker_count: usize,
        metrics: Arc<SweeperMetrics>,
    ) -> RetentionResult<Self> {
        let dir = markers_dir(working_dir);
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            min_age,
            worker_count: worker_count.max(1),
            metrics,
        })
    }

    /// Marker logs whose age passes the grace window, oldest first.
    /// Logs still being written (`.tmp`) are never returned.
    pub fn eligible_logs(&self) -> RetentionResult<Vec<PathBuf>> {
        let min_age = self.min_age.to_std().unwrap_or_default();
        let mut logs = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().map(|e| e == TMP_SUFFIX).unwrap_or(false) {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            let age = modified.elapsed().unwrap_or_default();
            if age >= min_age {
                logs.push((modified, path));
            }
        }

        logs.sort_by_key(|(modified, _)| *modified);
        Ok(logs.into_iter().map(|(_, path)| path).collect())
    }

    /// Read every chunk identifier from a marker log.
    ///
    /// A corrupt record is fatal for the log: truncating the tail would
    /// silently leak the chunk objects it names.
    pub fn read_marks(path: &Path) -> RetentionResult<Vec<Vec<u8>>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut marks = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_RECORD_LEN {
                return Err(RetentionError::Marker(format!(
                    "record length too large in {:?}: {}",
                    path, len
                )));
            }

            let mut data = vec![0u8; len];
            reader.read_exact(&mut data)?;

            let mut crc_buf = [0u8; 4];
            reader.read_exact(&mut crc_buf)?;
            let stored_crc = u32::from_le_bytes(crc_buf);

            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&len_buf);
            hasher.update(&data);
            if stored_crc != hasher.finalize() {
                return Err(RetentionError::Marker(format!(
                    "record checksum mismatch in {:?} at entry {}",
                    path,
                    marks.len()
                )));
            }

            marks.push(data);
        }

        Ok(marks)
    }

    /// Process one marker log: stream its identifiers through `on_chunk`
    /// with bounded concurrency and remove the log once every identifier
    /// was handled without error. Reprocessing the same log is safe.
    pub async fn process_log<F, Fut>(
        &self,
        path: &Path,
        cancel: &CancelFlag,
        on_chunk: F,
    ) -> RetentionResult<()>
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = RetentionResult<()>> + Send,
    {
        use futures_util::StreamExt;

        let marks = Self::read_marks(path)?;
        let total = marks.len();
        self.metrics.record_log_processed();

        let failures = AtomicU64::new(0);
        futures_util::stream::iter(marks)
            .for_each_concurrent(self.worker_count, |chunk_id| {
                let failures = &failures;
                let on_chunk = &on_chunk;
                async move {
                    if cancel.is_cancelled() {
                        failures.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    if on_chunk(chunk_id).await.is_err() {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
            .await;

        let failed = failures.load(Ordering::Relaxed);
        if failed > 0 {
            return Err(RetentionError::Marker(format!(
                "{} of {} entries failed for marker log {:?}; log retained",
                failed, total, path
            )));
        }

        std::fs::remove_file(path)?;
        self.metrics.record_log_removed();
        tracing::debug!(log = ?path, entries = total, "marker log processed and removed");
        Ok(())
    }
}
