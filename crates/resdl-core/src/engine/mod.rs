//! Download engine: resumable, pausable, cancellable transfers of server files.
//!
//! One tokio task per active file. Each task probes the size, resumes from the
//! bytes already in the [`ChunkStore`], streams the rest into the store, retries
//! transient failures with backoff and finally hands the assembled file to the
//! [`Finalizer`]. The UI only issues commands and reads snapshots or events.

mod attempt;
mod config;
mod registry;
mod run;
mod state;

pub use config::{EngineConfig, EngineConfigError};
pub use state::{TransferEvent, TransferState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::chunk_store::{ChunkStore, StoreError};
use crate::control::{AbortReason, TransferController};
use crate::finalizer::{Deliver, Finalizer};
use crate::progress::ProgressSnapshot;

use registry::{FileEntry, TransferHandle};

const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct DownloadEngine {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    cfg: EngineConfig,
    client: reqwest::Client,
    store: Arc<dyn ChunkStore>,
    finalizer: Finalizer,
    files: Mutex<HashMap<String, FileEntry>>,
    events: broadcast::Sender<TransferEvent>,
    generation: AtomicU64,
}

impl DownloadEngine {
    pub fn new(
        cfg: EngineConfig,
        store: Arc<dyn ChunkStore>,
        delivery: Arc<dyn Deliver>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                finalizer: Finalizer::new(store.clone(), delivery),
                cfg,
                client,
                store,
                files: Mutex::new(HashMap::new()),
                events,
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.cfg
    }

    /// Start (or resume) downloading `file`.
    ///
    /// No-op returning None while the file is already active. Otherwise the
    /// transfer runs on its own task; the handle resolves with the state the
    /// task ended in. Failures are reported through [`state`](Self::state),
    /// [`last_error`](Self::last_error) and events, never returned here.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, file: &str) -> Option<JoinHandle<TransferState>> {
        let controller = Arc::new(TransferController::new());
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut files = self.inner.files();
            let entry = files
                .entry(file.to_string())
                .or_insert_with(|| FileEntry::new(TransferState::Idle));
            if entry.is_busy() {
                tracing::debug!(file, "already active or being cancelled; start ignored");
                return None;
            }
            entry.last_error = None;
            entry.handle = Some(TransferHandle {
                controller: controller.clone(),
                generation,
            });
            entry.set_state(TransferState::Active);
        }
        tracing::info!(file, "transfer started");
        self.inner.emit(TransferEvent::StateChanged {
            file: file.to_string(),
            state: TransferState::Active,
        });

        let inner = self.inner.clone();
        let file = file.to_string();
        Some(tokio::spawn(async move {
            run::run_transfer(inner, file, controller, generation).await
        }))
    }

    /// Pause `file`: stop the running transfer and keep its stored chunks.
    /// Resolves once the transfer task has unwound. No-op when not active.
    pub async fn pause(&self, file: &str) -> TransferState {
        self.abort_and_wait(file, AbortReason::Pause).await
    }

    /// Cancel `file`: stop any running transfer, purge its chunks and metadata
    /// and reset it to `Idle`. Also purges a paused or never-started file.
    pub async fn cancel(&self, file: &str) -> Result<(), StoreError> {
        if self.abort_and_wait(file, AbortReason::Cancel).await.is_active() {
            // Restarted by someone else in the meantime; leave the new transfer alone.
            return Ok(());
        }
        let Some(reservation) = CancelReservation::acquire(&self.inner, file) else {
            return Ok(());
        };
        self.inner.store.purge(file).await?;
        let changed = {
            let mut files = self.inner.files();
            match files.get_mut(file) {
                Some(entry) => {
                    entry.progress = ProgressSnapshot::default();
                    entry.last_error = None;
                    entry.set_state(TransferState::Idle)
                }
                None => false,
            }
        };
        drop(reservation);
        if changed {
            self.inner.emit(TransferEvent::StateChanged {
                file: file.to_string(),
                state: TransferState::Idle,
            });
        }
        tracing::info!(file, "transfer cancelled");
        Ok(())
    }

    async fn abort_and_wait(&self, file: &str, reason: AbortReason) -> TransferState {
        let rx = {
            let files = self.inner.files();
            let Some(entry) = files.get(file) else {
                return TransferState::Idle;
            };
            match &entry.handle {
                Some(handle) => {
                    handle.controller.request_abort(reason);
                    entry.state.subscribe()
                }
                None => return entry.state(),
            }
        };
        wait_inactive(rx).await
    }

    /// Resolves with the first non-active state of `file`.
    pub async fn wait(&self, file: &str) -> TransferState {
        let rx = match self.inner.files().get(file) {
            Some(entry) => entry.state.subscribe(),
            None => return TransferState::Idle,
        };
        wait_inactive(rx).await
    }

    /// Register every file with stored data as `Paused` so it can be resumed.
    /// A file whose bytes are all stored (delivery failed last time) is also
    /// `Paused` at 100%; starting it goes straight to finalization without a
    /// request. Files already known to this engine are left untouched. Returns
    /// the names that were restored.
    pub async fn restore(&self) -> Result<Vec<String>, StoreError> {
        let mut restored = Vec::new();
        for name in self.inner.store.list_files().await? {
            let Some(stored) = self.inner.store.stored_transfer(&name).await? else {
                continue;
            };
            let inserted = {
                let mut files = self.inner.files();
                if files.contains_key(&name) {
                    false
                } else {
                    let mut entry = FileEntry::new(TransferState::Paused);
                    entry.progress = ProgressSnapshot {
                        percentage: stored.percentage(),
                        downloaded: stored.downloaded,
                        total: stored.total_size,
                        ..ProgressSnapshot::default()
                    };
                    files.insert(name.clone(), entry);
                    true
                }
            };
            if !inserted {
                continue;
            }
            if stored.is_complete() {
                tracing::info!(file = %name, downloaded = stored.downloaded, "restored fully stored transfer; next start only finalizes");
            } else {
                tracing::debug!(file = %name, downloaded = stored.downloaded, "restored paused transfer");
            }
            restored.push(name);
        }
        Ok(restored)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.inner.events.subscribe()
    }

    /// State of `file`; `Idle` for files the engine has never seen.
    pub fn state(&self, file: &str) -> TransferState {
        self.inner
            .files()
            .get(file)
            .map(FileEntry::state)
            .unwrap_or_default()
    }

    pub fn progress(&self, file: &str) -> Option<ProgressSnapshot> {
        self.inner.files().get(file).map(|e| e.progress)
    }

    pub fn last_error(&self, file: &str) -> Option<String> {
        self.inner
            .files()
            .get(file)
            .and_then(|e| e.last_error.clone())
    }

    /// File → percentage (None while the total is unknown).
    pub fn percentages(&self) -> HashMap<String, Option<f64>> {
        self.inner
            .files()
            .iter()
            .map(|(name, e)| (name.clone(), e.progress.percentage))
            .collect()
    }

    /// File → whether a transfer is running.
    pub fn active_flags(&self) -> HashMap<String, bool> {
        self.inner
            .files()
            .iter()
            .map(|(name, e)| (name.clone(), e.state().is_active()))
            .collect()
    }
}

/// Keeps `start` away from a file while `cancel` purges it.
struct CancelReservation<'a> {
    inner: &'a Inner,
    file: &'a str,
}

impl<'a> CancelReservation<'a> {
    /// None if a transfer became active before the reservation was taken.
    fn acquire(inner: &'a Inner, file: &'a str) -> Option<Self> {
        let mut files = inner.files();
        let entry = files
            .entry(file.to_string())
            .or_insert_with(|| FileEntry::new(TransferState::Idle));
        if entry.handle.is_some() || entry.state().is_active() {
            return None;
        }
        entry.cancelling += 1;
        Some(Self { inner, file })
    }
}

impl Drop for CancelReservation<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.inner.files().get_mut(self.file) {
            entry.cancelling = entry.cancelling.saturating_sub(1);
        }
    }
}

async fn wait_inactive(mut rx: tokio::sync::watch::Receiver<TransferState>) -> TransferState {
    let result = rx.wait_for(|s| !s.is_active()).await.map(|s| *s);
    result.unwrap_or_else(|_| *rx.borrow())
}

impl Inner {
    fn files(&self) -> MutexGuard<'_, HashMap<String, FileEntry>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TransferEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn publish_progress(&self, file: &str, snapshot: ProgressSnapshot) {
        if let Some(entry) = self.files().get_mut(file) {
            entry.progress = snapshot;
        }
        self.emit(TransferEvent::Progress {
            file: file.to_string(),
            snapshot,
        });
    }

    /// Record the end of the transfer task `generation` for `file`.
    fn finish(
        &self,
        file: &str,
        generation: u64,
        state: TransferState,
        snapshot: ProgressSnapshot,
        error: Option<String>,
    ) {
        {
            let mut files = self.files();
            let Some(entry) = files.get_mut(file) else {
                return;
            };
            if entry.handle.as_ref().map(|h| h.generation) != Some(generation) {
                return;
            }
            entry.handle = None;
            entry.progress = snapshot;
            entry.last_error = error.clone();
            entry.set_state(state);
        }
        if let Some(error) = error {
            self.emit(TransferEvent::Failed {
                file: file.to_string(),
                error,
            });
        }
        self.emit(TransferEvent::Progress {
            file: file.to_string(),
            snapshot,
        });
        self.emit(TransferEvent::StateChanged {
            file: file.to_string(),
            state,
        });
    }
}

#[cfg(test)]
mod tests;
