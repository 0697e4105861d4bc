//! In-memory registry of known files: state, latest progress, running task.

use std::sync::Arc;
use tokio::sync::watch;

use super::state::TransferState;
use crate::control::TransferController;
use crate::progress::ProgressSnapshot;

/// Running transfer for one file. Present exactly while the state is `Active`.
pub(super) struct TransferHandle {
    pub(super) controller: Arc<TransferController>,
    pub(super) generation: u64,
}

pub(super) struct FileEntry {
    pub(super) state: watch::Sender<TransferState>,
    pub(super) progress: ProgressSnapshot,
    pub(super) last_error: Option<String>,
    pub(super) handle: Option<TransferHandle>,
    /// Cancels currently purging this file. `start` is refused while non-zero.
    pub(super) cancelling: usize,
}

impl FileEntry {
    pub(super) fn new(state: TransferState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            progress: ProgressSnapshot::default(),
            last_error: None,
            handle: None,
            cancelling: 0,
        }
    }

    pub(super) fn is_busy(&self) -> bool {
        self.handle.is_some() || self.cancelling > 0 || self.state().is_active()
    }

    pub(super) fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    /// Replace the state; returns true if it changed.
    pub(super) fn set_state(&self, next: TransferState) -> bool {
        self.state.send_replace(next) != next
    }
}
