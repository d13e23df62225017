//! Background chunk reclamation
//!
//! The sweeper is a long-lived actor wrapping the marker processor with a
//! chunk-delete callback and metrics. Each cycle it enumerates marker logs
//! older than the grace window and deletes the chunk objects they name with
//! bounded parallelism. Already-gone objects count as `not_found` and do
//! not fail the log; any other delete error retains the log for the next
//! cycle.

use crate::chunk::types::tenant_prefix;
use crate::chunk::ChunkClient;
use crate::error::{RetentionError, RetentionResult};
use crate::retention::marker::MarkerProcessor;
use crate::retention::metrics::{DeleteStatus, SweeperMetrics};
use crate::retention::CancelFlag;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};
use tokio::time::interval;

/// Deletes marked chunk objects from the object store
pub struct Sweeper {
    processor: MarkerProcessor,
    chunk_client: Arc<dyn ChunkClient>,
    metrics: Arc<SweeperMetrics>,
    sweep_interval: Duration,
    running: Arc<RwLock<bool>>,
    cancel: CancelFlag,
    shutdown: Notify,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Sweeper {
    /// Create a sweeper over the marker logs in `working_dir`.
    ///
    /// `min_age` is the grace window: it must exceed the longest in-flight
    /// read by any consumer that might still hold a stale chunk reference.
    pub fn new(
        working_dir: &Path,
        chunk_client: Arc<dyn ChunkClient>,
        delete_worker_count: usize,
        min_age: chrono::Duration,
        sweep_interval: Duration,
    ) -> RetentionResult<Self> {
        let metrics = Arc::new(SweeperMetrics::new());
        let processor =
            MarkerProcessor::new(working_dir, min_age, delete_worker_count, metrics.clone())?;

        Ok(Self {
            processor,
            chunk_client,
            metrics,
            sweep_interval,
            running: Arc::new(RwLock::new(true)),
            cancel: CancelFlag::new(),
            shutdown: Notify::new(),
            handle: Mutex::new(None),
        })
    }

    pub fn metrics(&self) -> Arc<SweeperMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawn the background sweep loop
    pub fn start(self: &Arc<Self>) {
        let sweeper = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(sweeper.sweep_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = sweeper.shutdown.notified() => break,
                }
                if !*sweeper.running.read().await {
                    break;
                }
                sweeper.sweep_once().await;
            }
        });

        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Request shutdown and block until the worker loop drains its current
    /// unit of work
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.cancel.cancel();
        self.shutdown.notify_one();

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Run one sweep cycle over all eligible marker logs.
    ///
    /// Errors on individual logs are recorded and logged; the remaining
    /// logs are still processed.
    pub async fn sweep_once(&self) {
        let logs = match self.processor.eligible_logs() {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!("failed to enumerate marker logs: {}", e);
                return;
            }
        };

        for path in logs {
            if self.cancel.is_cancelled() {
                break;
            }
            let result = self
                .processor
                .process_log(&path, &self.cancel, |chunk_id| self.delete_chunk(chunk_id))
                .await;
            if let Err(e) = result {
                tracing::warn!(log = ?path, "marker log not fully processed: {}", e);
            }
        }
    }

    async fn delete_chunk(&self, chunk_id: Vec<u8>) -> RetentionResult<()> {
        let started = Instant::now();
        let result = self.delete_chunk_inner(&chunk_id).await;

        let status = match &result {
            Ok(()) => DeleteStatus::Success,
            Err(e) if e.is_not_found() => DeleteStatus::NotFound,
            Err(_) => DeleteStatus::Failure,
        };
        self.metrics.record_delete(status, started.elapsed());

        match result {
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    chunk_id = %String::from_utf8_lossy(&chunk_id),
                    "delete on not found chunk"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    chunk_id = %String::from_utf8_lossy(&chunk_id),
                    "error deleting chunk: {}", e
                );
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn delete_chunk_inner(&self, chunk_id: &[u8]) -> RetentionResult<()> {
        let invalid =
            || RetentionError::InvalidChunkKey(String::from_utf8_lossy(chunk_id).into_owned());

        let user_id = tenant_prefix(chunk_id)?;
        let user_id = std::str::from_utf8(user_id).map_err(|_| invalid())?;
        let chunk_id = std::str::from_utf8(chunk_id).map_err(|_| invalid())?;

        self.chunk_client.delete_chunk(user_id, chunk_id).await
    }
}
