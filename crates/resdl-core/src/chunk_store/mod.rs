//! Persistent chunk store.
//!
//! Two logical tables keyed by file name: an ordered list of raw byte chunks,
//! and per-file metadata (total size plus the validators used for safe resume).
//! The engine talks to the store only through [`ChunkStore`], so the SQLite
//! backend and the in-memory backend are interchangeable.

mod db;
mod memory;
mod types;

pub use db::SqliteChunkStore;
pub use memory::MemoryChunkStore;
pub use types::{FileMeta, StoreError, StoredTransfer};

use async_trait::async_trait;

/// Async key-value storage for downloaded chunks and per-file metadata.
///
/// Operations on different file names never interfere. Appends for one file are
/// atomic: a crash leaves either the full chunk or nothing.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Append one fully received chunk at the end of the file's chunk list.
    async fn append_chunk(&self, file: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// All chunks for the file in append order (empty if none).
    async fn read_chunks(&self, file: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Remove every chunk for the file. Clearing an absent file is a no-op.
    async fn clear_chunks(&self, file: &str) -> Result<(), StoreError>;

    /// Upsert metadata; last write wins.
    async fn save_meta(&self, file: &str, meta: &FileMeta) -> Result<(), StoreError>;

    async fn read_meta(&self, file: &str) -> Result<Option<FileMeta>, StoreError>;

    /// Remove metadata for the file. Clearing an absent file is a no-op.
    async fn clear_meta(&self, file: &str) -> Result<(), StoreError>;

    /// Total stored bytes for the file; equals the summed lengths of `read_chunks`.
    async fn sum_chunk_bytes(&self, file: &str) -> Result<u64, StoreError> {
        let chunks = self.read_chunks(file).await?;
        Ok(chunks.iter().map(|c| c.len() as u64).sum())
    }

    /// Names of every file with stored chunks or metadata, sorted.
    async fn list_files(&self) -> Result<Vec<String>, StoreError>;

    /// Drop chunks and metadata for the file.
    async fn purge(&self, file: &str) -> Result<(), StoreError> {
        self.clear_chunks(file).await?;
        self.clear_meta(file).await
    }

    /// Summary of a stored (partial) transfer, or None if nothing is stored.
    async fn stored_transfer(&self, file: &str) -> Result<Option<StoredTransfer>, StoreError> {
        let downloaded = self.sum_chunk_bytes(file).await?;
        let meta = self.read_meta(file).await?;
        if downloaded == 0 && meta.is_none() {
            return Ok(None);
        }
        Ok(Some(StoredTransfer {
            file_name: file.to_string(),
            downloaded,
            total_size: meta.and_then(|m| m.total_size),
        }))
    }
}
