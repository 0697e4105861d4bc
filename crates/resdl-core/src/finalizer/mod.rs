//! Final assembly and delivery.
//!
//! Once every byte of a file is stored, the chunks are read back in order,
//! concatenated into one artifact and handed to a [`Deliver`] sink. The store is
//! purged only after delivery succeeded; on failure the chunks stay so a later
//! start can finalize again without re-downloading.

mod directory;
mod sanitize;

pub use directory::DirectoryDelivery;
pub use sanitize::sanitize_file_name;

use async_trait::async_trait;
use std::sync::Arc;

use crate::chunk_store::{ChunkStore, StoreError};

/// Destination for assembled files.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, file_name: &str, artifact: Vec<u8>) -> std::io::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    /// Reading the stored chunks back failed.
    #[error("assembly failed: {0}")]
    Assembly(#[source] StoreError),
    /// Stored byte count does not match the known total.
    #[error("assembled {assembled} bytes, expected {expected}")]
    SizeMismatch { expected: u64, assembled: u64 },
    #[error("delivery failed: {0}")]
    Delivery(#[source] std::io::Error),
}

#[derive(Clone)]
pub struct Finalizer {
    store: Arc<dyn ChunkStore>,
    delivery: Arc<dyn Deliver>,
}

impl Finalizer {
    pub fn new(store: Arc<dyn ChunkStore>, delivery: Arc<dyn Deliver>) -> Self {
        Self { store, delivery }
    }

    /// Assemble, deliver and purge `file`. Returns the artifact size.
    pub async fn finalize(&self, file: &str, expected: Option<u64>) -> Result<u64, FinalizeError> {
        let chunks = self
            .store
            .read_chunks(file)
            .await
            .map_err(FinalizeError::Assembly)?;
        let artifact = chunks.concat();
        let assembled = artifact.len() as u64;
        if let Some(expected) = expected {
            if assembled != expected {
                return Err(FinalizeError::SizeMismatch {
                    expected,
                    assembled,
                });
            }
        }

        self.delivery
            .deliver(file, artifact)
            .await
            .map_err(FinalizeError::Delivery)?;
        tracing::info!(file, bytes = assembled, "delivered");

        // Delivery already happened; a stale copy in the store only costs space.
        if let Err(e) = self.store.purge(file).await {
            tracing::warn!(file, "failed to purge stored chunks after delivery: {}", e);
        }
        Ok(assembled)
    }
}
