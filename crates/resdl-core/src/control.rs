//! Transfer control for pause/cancel: one abort flag plus cancellation token per running transfer.
//!
//! The engine creates a `TransferController` when a transfer starts. Pause and
//! cancel call `request_abort`; the download loop sees the flag before every
//! chunk, and every suspension point (probe, chunk read, backoff sleep) races
//! against `cancelled()` so an in-flight read is dropped instead of awaited.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

/// Why a transfer was stopped by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Keep stored chunks; the transfer can resume later.
    Pause,
    /// Stored chunks will be purged.
    Cancel,
}

impl AbortReason {
    fn to_u8(self) -> u8 {
        match self {
            AbortReason::Pause => 1,
            AbortReason::Cancel => 2,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(AbortReason::Pause),
            2 => Some(AbortReason::Cancel),
            _ => None,
        }
    }
}

/// Error returned when a transfer is stopped by user (pause/cancel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferAborted {
    pub reason: AbortReason,
}

impl TransferAborted {
    pub fn pause() -> Self {
        Self {
            reason: AbortReason::Pause,
        }
    }
}

impl fmt::Display for TransferAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            AbortReason::Pause => write!(f, "transfer paused by user"),
            AbortReason::Cancel => write!(f, "transfer cancelled by user"),
        }
    }
}

impl std::error::Error for TransferAborted {}

/// Per-transfer abort flag and cancellation handle.
#[derive(Debug, Default)]
pub struct TransferController {
    aborted: AtomicBool,
    reason: AtomicU8,
    token: CancellationToken,
}

impl TransferController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the abort flag and cancel pending I/O. The first reason wins.
    pub fn request_abort(&self, reason: AbortReason) {
        let _ = self
            .reason
            .compare_exchange(0, reason.to_u8(), Ordering::SeqCst, Ordering::SeqCst);
        self.aborted.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<AbortReason> {
        AbortReason::from_u8(self.reason.load(Ordering::SeqCst))
    }

    /// Err(TransferAborted) once abort was requested. Cooperative cancellation point.
    pub fn check(&self) -> Result<(), TransferAborted> {
        if self.is_aborted() {
            return Err(self.aborted_error());
        }
        Ok(())
    }

    pub fn aborted_error(&self) -> TransferAborted {
        TransferAborted {
            reason: self.reason().unwrap_or(AbortReason::Pause),
        }
    }

    /// Resolves when abort is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Child token that fires with this controller; used by the progress ticker.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
