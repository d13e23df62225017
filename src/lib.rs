//! # Tidemark
//!
//! Retention core for a time-partitioned log storage engine: decides which
//! previously-ingested chunks of log data have outlived their retention
//! policy, partially trims chunks that straddle retention boundaries, and
//! physically reclaims chunk objects while keeping per-table indexes
//! consistent.
//!
//! ## How it works
//!
//! Retention is a two-phase mark-and-sweep:
//!
//! - The **marker** scans one index table at a time, consults an expiration
//!   policy per chunk, rewrites partially expired chunks into smaller
//!   replacements, drops index entries, and appends doomed chunk
//!   identifiers to a durable marker log.
//! - The **sweeper** runs in the background, waits out a grace window, and
//!   deletes the marked chunk objects with bounded parallelism. Deleting an
//!   already-gone chunk is a no-op, so crashes and retries are safe.
//!
//! ## Modules
//!
//! - [`chunk`]: chunk model, blob codec, object store clients
//! - [`index`]: table abstractions and the in-memory table index
//! - [`retention`]: marker, rewriter, sweeper and the expiration boundary
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidemark::chunk::{ChunkClient, ChunkStore, FilesystemChunkClient};
//! use tidemark::config::Config;
//! use tidemark::index::MemoryTableIndex;
//! use tidemark::retention::{CancelFlag, Sweeper, TableMarker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let client = Arc::new(FilesystemChunkClient::new(&config.storage.chunk_dir)?);
//!
//!     // Mark phase: process one table
//!     let marker = TableMarker::new(
//!         &config.storage.working_dir,
//!         config.retention.table_schema(),
//!         Arc::new(config.retention.expiration_checker()),
//!         client.clone() as Arc<dyn ChunkStore>,
//!     );
//!     let mut table = MemoryTableIndex::load("index_19000.json".as_ref())?;
//!     let cancel = CancelFlag::new();
//!     let (empty, modified) =
//!         marker.mark_for_delete(&cancel, "index_19000", "tenant-a", &mut table)?;
//!     println!("table empty: {}, modified: {}", empty, modified);
//!
//!     // Sweep phase: background reclamation
//!     let sweeper = Arc::new(Sweeper::new(
//!         config.storage.working_dir.as_ref(),
//!         client as Arc<dyn ChunkClient>,
//!         config.retention.delete_worker_count,
//!         config.retention.delete_min_age(),
//!         config.retention.sweep_interval(),
//!     )?);
//!     sweeper.start();
//!     // ... run until shutdown ...
//!     sweeper.stop().await;
//!
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod index;
pub mod retention;

// Re-export top-level types for convenience
pub use chunk::{
    Chunk, ChunkClient, ChunkEntry, ChunkKey, ChunkRef, ChunkStore, FilesystemChunkClient,
    IntervalFilter, Labels, LineFilter, LogEntry, TimeInterval,
};

pub use error::{RetentionError, RetentionResult};

pub use index::{ChunkIndexer, IndexProcessor, MemoryTableIndex, TableSchema};

pub use retention::{
    CancelFlag, ExpirationChecker, MarkerMetrics, PeriodExpirationChecker, Sweeper, SweeperMetrics,
    TableMarker,
};

pub use config::{Config, ConfigError, LoggingConfig, RetentionConfig, StorageConfig};
