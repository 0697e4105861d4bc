#![allow(dead_code)]

pub mod range_server;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use resdl_core::chunk_store::{ChunkStore, FileMeta, MemoryChunkStore, StoreError};
use resdl_core::finalizer::Deliver;
use resdl_core::retry::RetryPolicy;
use resdl_core::{DownloadEngine, EngineConfig};

/// Deterministic test body of `len` bytes.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Keeps delivered artifacts in memory; can be told to fail.
#[derive(Default)]
pub struct CollectingDelivery {
    pub delivered: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: AtomicBool,
}

impl CollectingDelivery {
    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliver for CollectingDelivery {
    async fn deliver(&self, file_name: &str, artifact: Vec<u8>) -> std::io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("delivery refused"));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((file_name.to_string(), artifact));
        Ok(())
    }
}

/// Memory store whose first `fail_appends` appends fail (quota exceeded and the like).
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryChunkStore,
    pub fail_appends: AtomicUsize,
}

#[async_trait]
impl ChunkStore for FlakyStore {
    async fn append_chunk(&self, file: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let left = self.fail_appends.load(Ordering::SeqCst);
        if left > 0 {
            self.fail_appends.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("quota exceeded".into()));
        }
        self.inner.append_chunk(file, bytes).await
    }

    async fn read_chunks(&self, file: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        self.inner.read_chunks(file).await
    }

    async fn clear_chunks(&self, file: &str) -> Result<(), StoreError> {
        self.inner.clear_chunks(file).await
    }

    async fn save_meta(&self, file: &str, meta: &FileMeta) -> Result<(), StoreError> {
        self.inner.save_meta(file, meta).await
    }

    async fn read_meta(&self, file: &str) -> Result<Option<FileMeta>, StoreError> {
        self.inner.read_meta(file).await
    }

    async fn clear_meta(&self, file: &str) -> Result<(), StoreError> {
        self.inner.clear_meta(file).await
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_files().await
    }
}

/// Engine config for `base_url` with fast retries.
pub fn fast_config(base_url: &str, max_attempts: u32) -> EngineConfig {
    let mut cfg = EngineConfig::new(url::Url::parse(base_url).unwrap()).unwrap();
    cfg.retry = RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    };
    cfg.progress_interval = Duration::from_millis(20);
    cfg.idle_timeout = Some(Duration::from_secs(5));
    cfg
}

pub fn engine(
    cfg: EngineConfig,
    store: Arc<dyn ChunkStore>,
    delivery: Arc<CollectingDelivery>,
) -> DownloadEngine {
    DownloadEngine::new(cfg, store, delivery).unwrap()
}
