//! Transfer error type for retry classification.

use std::time::Duration;

use crate::chunk_store::StoreError;
use crate::control::TransferAborted;
use crate::finalizer::FinalizeError;

/// Error from one download attempt (or from finalization).
/// Classified by [`super::classify`] before the engine decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Request failed or the connection dropped mid-body.
    #[error("network: {0}")]
    Network(#[from] reqwest::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u16),
    /// No chunk arrived within the idle timeout.
    #[error("no data received for {0:?}")]
    Timeout(Duration),
    /// Local chunk store failed.
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    /// Stream ended cleanly before the expected total was stored
    /// (e.g. server closed early). Retried instead of finalizing a short file.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    Protocol { expected: u64, received: u64 },
    /// 206 response whose Content-Range does not start at the requested offset.
    #[error("server returned range starting at {got}, requested {requested}")]
    UnexpectedRange { requested: u64, got: u64 },
    /// Stored byte count no longer matches what this transfer wrote, so chunks
    /// were removed underneath it. The chunks are cleared before this is returned.
    #[error("stored chunks changed during transfer: expected {expected} bytes, found {found}")]
    StoreDiverged { expected: u64, found: u64 },
    /// ETag/Last-Modified differ from the stored chunks' validators.
    /// `purged` is true when stored chunks were dropped so the next attempt restarts at zero.
    #[error("remote file changed since stored chunks were fetched")]
    RemoteChanged { purged: bool },
    /// Pause or cancel requested; never surfaced as a failure.
    #[error(transparent)]
    Aborted(#[from] TransferAborted),
    /// Assembly or delivery failed after all bytes were stored.
    #[error("finalize: {0}")]
    Finalization(#[from] FinalizeError),
}

impl TransferError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferError::Aborted(_))
    }
}
