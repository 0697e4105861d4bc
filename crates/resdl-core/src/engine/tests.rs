//! Engine state-machine tests that need no HTTP server.

use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use url::Url;

use super::*;
use crate::chunk_store::{FileMeta, MemoryChunkStore};
use crate::retry::RetryPolicy;

struct NullDelivery;

#[async_trait]
impl Deliver for NullDelivery {
    async fn deliver(&self, _file_name: &str, _artifact: Vec<u8>) -> std::io::Result<()> {
        Ok(())
    }
}

/// Engine pointed at a port nothing listens on.
fn engine(store: Arc<dyn ChunkStore>, base_delay: Duration) -> DownloadEngine {
    let mut cfg = EngineConfig::new(Url::parse("http://127.0.0.1:1").unwrap()).unwrap();
    cfg.retry = RetryPolicy {
        max_attempts: 3,
        base_delay,
        max_delay: base_delay,
        ..RetryPolicy::default()
    };
    cfg.connect_timeout = Duration::from_secs(2);
    DownloadEngine::new(cfg, store, Arc::new(NullDelivery)).unwrap()
}

/// Memory store whose first `clear_chunks` parks until `release` is notified.
#[derive(Default)]
struct GatedStore {
    inner: MemoryChunkStore,
    gate_used: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ChunkStore for GatedStore {
    async fn append_chunk(&self, file: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.append_chunk(file, bytes).await
    }

    async fn read_chunks(&self, file: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        self.inner.read_chunks(file).await
    }

    async fn clear_chunks(&self, file: &str) -> Result<(), StoreError> {
        if !self.gate_used.swap(true, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
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

#[tokio::test]
async fn unknown_file_is_idle() {
    let eng = engine(Arc::new(MemoryChunkStore::new()), Duration::ZERO);
    assert_eq!(eng.state("nope.bin"), TransferState::Idle);
    assert!(eng.progress("nope.bin").is_none());
    assert!(eng.last_error("nope.bin").is_none());
    assert_eq!(eng.wait("nope.bin").await, TransferState::Idle);
    assert_eq!(eng.pause("nope.bin").await, TransferState::Idle);
}

#[tokio::test]
async fn unreachable_server_ends_in_error_and_keeps_chunks() {
    let store = Arc::new(MemoryChunkStore::new());
    store.append_chunk("a.bin", b"abc").await.unwrap();
    store
        .save_meta("a.bin", &FileMeta::with_total(10))
        .await
        .unwrap();
    let eng = engine(store.clone(), Duration::ZERO);

    let handle = eng.start("a.bin").expect("first start runs");
    assert_eq!(handle.await.unwrap(), TransferState::Error);
    assert_eq!(eng.state("a.bin"), TransferState::Error);
    assert!(eng.last_error("a.bin").is_some());
    assert_eq!(store.sum_chunk_bytes("a.bin").await.unwrap(), 3);
    assert_eq!(eng.progress("a.bin").unwrap().percentage, Some(30.0));
}

#[tokio::test]
async fn pause_interrupts_backoff_sleep() {
    let store = Arc::new(MemoryChunkStore::new());
    let eng = engine(store, Duration::from_secs(30));
    eng.start("slow.bin").unwrap();
    assert!(eng.start("slow.bin").is_none());
    assert_eq!(eng.active_flags().get("slow.bin"), Some(&true));

    let paused = tokio::time::timeout(Duration::from_secs(5), eng.pause("slow.bin"))
        .await
        .expect("pause must not wait for the backoff");
    assert_eq!(paused, TransferState::Paused);
    assert_eq!(eng.active_flags().get("slow.bin"), Some(&false));
    assert!(eng.last_error("slow.bin").is_none());
}

#[tokio::test]
async fn cancel_purges_idle_and_paused_files() {
    let store = Arc::new(MemoryChunkStore::new());
    store.append_chunk("old.bin", b"0123").await.unwrap();
    store
        .save_meta("old.bin", &FileMeta::with_total(8))
        .await
        .unwrap();
    let eng = engine(store.clone(), Duration::ZERO);

    eng.cancel("old.bin").await.unwrap();
    assert_eq!(store.sum_chunk_bytes("old.bin").await.unwrap(), 0);
    assert!(store.read_meta("old.bin").await.unwrap().is_none());
    assert_eq!(eng.state("old.bin"), TransferState::Idle);

    // Idempotent.
    eng.cancel("old.bin").await.unwrap();
    eng.cancel("never-seen.bin").await.unwrap();
}

#[tokio::test]
async fn restore_registers_stored_files_as_paused() {
    let store = Arc::new(MemoryChunkStore::new());
    store.append_chunk("half.bin", &[0u8; 50]).await.unwrap();
    store
        .save_meta("half.bin", &FileMeta::with_total(100))
        .await
        .unwrap();
    store.append_chunk("unknown.bin", &[1u8; 7]).await.unwrap();
    let eng = engine(store, Duration::ZERO);

    let restored = eng.restore().await.unwrap();
    assert_eq!(restored, vec!["half.bin".to_string(), "unknown.bin".to_string()]);
    assert_eq!(eng.state("half.bin"), TransferState::Paused);
    let pcts = eng.percentages();
    assert_eq!(pcts.get("half.bin"), Some(&Some(50.0)));
    assert_eq!(pcts.get("unknown.bin"), Some(&None));
    assert_eq!(eng.progress("unknown.bin").unwrap().downloaded, 7);

    // Second scan leaves known files alone.
    assert!(eng.restore().await.unwrap().is_empty());
}

#[tokio::test]
async fn events_report_state_changes() {
    let eng = engine(Arc::new(MemoryChunkStore::new()), Duration::ZERO);
    let mut rx = eng.subscribe();
    eng.start("e.bin").unwrap().await.unwrap();

    let mut states = Vec::new();
    let mut failed = false;
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.file(), "e.bin");
        match event {
            TransferEvent::StateChanged { state, .. } => states.push(state),
            TransferEvent::Failed { .. } => failed = true,
            TransferEvent::Progress { .. } => {}
        }
    }
    assert_eq!(states, vec![TransferState::Active, TransferState::Error]);
    assert!(failed);
}

#[tokio::test]
async fn start_is_refused_while_cancel_purges() {
    let store = Arc::new(GatedStore::default());
    store.inner.append_chunk("race.bin", b"0123").await.unwrap();
    store
        .inner
        .save_meta("race.bin", &FileMeta::with_total(8))
        .await
        .unwrap();
    let eng = engine(store.clone(), Duration::from_secs(30));

    let cancel = {
        let eng = eng.clone();
        tokio::spawn(async move { eng.cancel("race.bin").await })
    };
    store.entered.notified().await;
    assert!(eng.start("race.bin").is_none(), "start slipped in before the purge");
    assert_eq!(eng.active_flags().get("race.bin"), Some(&false));

    store.release.notify_one();
    cancel.await.unwrap().unwrap();
    assert_eq!(eng.state("race.bin"), TransferState::Idle);
    assert_eq!(store.sum_chunk_bytes("race.bin").await.unwrap(), 0);
    assert!(store.read_meta("race.bin").await.unwrap().is_none());

    // Reservation is released once the purge is done.
    assert!(eng.start("race.bin").is_some());
    assert_eq!(eng.pause("race.bin").await, TransferState::Paused);
}

#[tokio::test]
async fn restored_complete_file_finalizes_without_request() {
    let store = Arc::new(MemoryChunkStore::new());
    store.append_chunk("done.bin", &[7u8; 64]).await.unwrap();
    store
        .save_meta("done.bin", &FileMeta::with_total(64))
        .await
        .unwrap();
    // Nothing listens at the configured server, so any request would fail.
    let eng = engine(store.clone(), Duration::ZERO);

    assert_eq!(eng.restore().await.unwrap(), vec!["done.bin".to_string()]);
    assert_eq!(eng.state("done.bin"), TransferState::Paused);
    assert_eq!(eng.percentages().get("done.bin"), Some(&Some(100.0)));

    let handle = eng.start("done.bin").unwrap();
    assert_eq!(handle.await.unwrap(), TransferState::Completed);
    assert!(store.list_files().await.unwrap().is_empty());
}
