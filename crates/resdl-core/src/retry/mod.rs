//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, throttling,
//! connection drops, storage and protocol failures) and backoff decisions so
//! that the engine's attempt loop stays a thin driver around them.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_http_status, classify_reqwest_error};
pub use error::TransferError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
