//! Per-file transfer state and the events broadcast to observers.

use std::fmt;

use crate::progress::ProgressSnapshot;

/// Lifecycle of one file transfer.
///
/// `Idle → Active → {Paused, Completed, Error}`; `Paused`/`Error` go back to
/// `Active` on the next start, and any state returns to `Idle` via cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    Active,
    Paused,
    Completed,
    Error,
}

impl TransferState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferState::Idle => "idle",
            TransferState::Active => "active",
            TransferState::Paused => "paused",
            TransferState::Completed => "completed",
            TransferState::Error => "error",
        }
    }

    pub fn is_active(self) -> bool {
        self == TransferState::Active
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification published by the engine. Receivers that lag only lose
/// intermediate events; snapshot accessors always hold the latest values.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    StateChanged {
        file: String,
        state: TransferState,
    },
    Progress {
        file: String,
        snapshot: ProgressSnapshot,
    },
    /// Retries exhausted or finalization failed.
    Failed { file: String, error: String },
}

impl TransferEvent {
    pub fn file(&self) -> &str {
        match self {
            TransferEvent::StateChanged { file, .. }
            | TransferEvent::Progress { file, .. }
            | TransferEvent::Failed { file, .. } => file,
        }
    }
}
