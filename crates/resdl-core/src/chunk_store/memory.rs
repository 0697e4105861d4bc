//! Process-local chunk store. Nothing survives a restart.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use super::types::{FileMeta, StoreError};
use super::ChunkStore;

#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    meta: Mutex<HashMap<String, FileMeta>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn append_chunk(&self, file: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.chunks
            .lock()
            .map_err(poisoned)?
            .entry(file.to_string())
            .or_default()
            .push(bytes.to_vec());
        Ok(())
    }

    async fn read_chunks(&self, file: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .chunks
            .lock()
            .map_err(poisoned)?
            .get(file)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_chunks(&self, file: &str) -> Result<(), StoreError> {
        self.chunks.lock().map_err(poisoned)?.remove(file);
        Ok(())
    }

    async fn save_meta(&self, file: &str, meta: &FileMeta) -> Result<(), StoreError> {
        self.meta
            .lock()
            .map_err(poisoned)?
            .insert(file.to_string(), meta.clone());
        Ok(())
    }

    async fn read_meta(&self, file: &str) -> Result<Option<FileMeta>, StoreError> {
        Ok(self.meta.lock().map_err(poisoned)?.get(file).cloned())
    }

    async fn clear_meta(&self, file: &str) -> Result<(), StoreError> {
        self.meta.lock().map_err(poisoned)?.remove(file);
        Ok(())
    }

    async fn sum_chunk_bytes(&self, file: &str) -> Result<u64, StoreError> {
        Ok(self
            .chunks
            .lock()
            .map_err(poisoned)?
            .get(file)
            .map(|parts| parts.iter().map(|c| c.len() as u64).sum())
            .unwrap_or(0))
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        let mut names: BTreeSet<String> = self
            .chunks
            .lock()
            .map_err(poisoned)?
            .iter()
            .filter(|(_, parts)| !parts.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.extend(self.meta.lock().map_err(poisoned)?.keys().cloned());
        Ok(names.into_iter().collect())
    }
}
