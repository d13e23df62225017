//! Chunk object store clients
//!
//! Two views of the same store, matching how the retention pipeline uses it:
//!
//! - [`ChunkStore`]: synchronous get/put, called from inside a table scan by
//!   the chunk rewriter.
//! - [`ChunkClient`]: asynchronous delete, called from the sweeper's worker
//!   pool.
//!
//! [`FilesystemChunkClient`] implements both against a local directory tree,
//! one file per external key, with temp-file + rename writes so a chunk is
//! either fully present or absent.

use crate::chunk::codec;
use crate::chunk::types::{Chunk, ChunkKey};
use crate::error::{RetentionError, RetentionResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Synchronous chunk fetch/upload, used by the rewriter during a scan
pub trait ChunkStore: Send + Sync {
    /// Fetch the chunks addressed by `keys`.
    ///
    /// A missing object is an error: retention never asks for chunks the
    /// index does not reference.
    fn get_chunks(&self, keys: &[ChunkKey]) -> RetentionResult<Vec<Chunk>>;

    /// Upload chunks. Writes are atomic per key with read-after-write
    /// visibility; re-uploading an existing key overwrites it.
    fn put_chunks(&self, chunks: &[Chunk]) -> RetentionResult<()>;
}

/// Asynchronous chunk deletion, used by the sweeper
#[async_trait]
pub trait ChunkClient: Send + Sync {
    /// Delete the chunk object addressed by `chunk_id`.
    ///
    /// Returns `RetentionError::ChunkNotFound` when the object is already
    /// gone; the sweeper treats that as success.
    async fn delete_chunk(&self, user_id: &str, chunk_id: &str) -> RetentionResult<()>;
}

/// Chunk store backed by a local directory
///
/// Each chunk lives at `<root>/<external key>`, so the tenant prefix of the
/// key becomes a directory level.
pub struct FilesystemChunkClient {
    root: PathBuf,
}

impl FilesystemChunkClient {
    /// Open (and create if needed) a chunk store rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> RetentionResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn object_path(&self, chunk_id: &str) -> PathBuf {
        self.root.join(chunk_id)
    }

    /// True if the store currently holds an object under `chunk_id`
    pub fn contains(&self, chunk_id: &str) -> bool {
        self.object_path(chunk_id).exists()
    }
}

impl ChunkStore for FilesystemChunkClient {
    fn get_chunks(&self, keys: &[ChunkKey]) -> RetentionResult<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(keys.len());
        for key in keys {
            let external = key.external();
            let blob = match std::fs::read(self.object_path(&external)) {
                Ok(blob) => blob,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(RetentionError::ChunkNotFound(external));
                }
                Err(e) => return Err(e.into()),
            };
            chunks.push(codec::decode_chunk(&key.user_id, &blob)?);
        }
        Ok(chunks)
    }

    fn put_chunks(&self, chunks: &[Chunk]) -> RetentionResult<()> {
        for chunk in chunks {
            let external = chunk.external_key();
            let path = self.object_path(&external);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let blob = codec::encode_chunk(chunk)?;
            let tmp = path.with_extension("tmp");
            std::fs::write(&tmp, &blob)?;
            std::fs::rename(&tmp, &path)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkClient for FilesystemChunkClient {
    async fn delete_chunk(&self, _user_id: &str, chunk_id: &str) -> RetentionResult<()> {
        match tokio::fs::remove_file(self.object_path(chunk_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RetentionError::ChunkNotFound(chunk_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
