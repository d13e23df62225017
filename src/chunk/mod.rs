//! Chunk model, codec and object store clients
//!
//! A chunk is an immutable, codec-encoded blob of log entries addressed by
//! an external key whose textual form starts with `<tenant>/`. This module
//! provides:
//!
//! - **types**: chunk references, label sets, intervals, external keys
//! - **codec**: the blob format and the `rebound` slicing operation
//! - **client**: object store traits plus a filesystem-backed implementation

pub mod client;
pub mod codec;
pub mod types;

pub use client::{ChunkClient, ChunkStore, FilesystemChunkClient};
pub use codec::{decode_chunk, encode_chunk, rebound};
pub use types::{
    tenant_prefix, Chunk, ChunkEntry, ChunkKey, ChunkRef, IntervalFilter, Labels, LineFilter,
    LogEntry, TimeInterval,
};
