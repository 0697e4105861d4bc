use std::time::Duration;

use crate::config::{BackoffMode, RetryConfig};

/// High-level classification of an error for retry purposes.
///
/// Callers map HTTP status codes, reqwest errors, storage and protocol
/// failures into these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No data arrived in time (connect or idle read).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, body cut short, etc.).
    Connection,
    /// Any other non-2xx status.
    Http(u16),
    /// Local chunk store failure.
    Storage,
    /// Server closed early or answered a different range than requested.
    Protocol,
    /// Never retried.
    Fatal,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded retry policy with linear or exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    pub backoff: BackoffMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
            backoff: cfg.backoff,
        }
    }

    /// Compute the next backoff delay for a given attempt and error kind.
    ///
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// once `attempt` reaches `max_attempts`, so a transfer that keeps failing
    /// makes exactly `max_attempts` attempts.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        let factor = match self.backoff {
            BackoffMode::Linear => attempt.max(1),
            BackoffMode::Exponential => 1u32 << attempt.saturating_sub(1).min(8),
        };
        let mut delay = self.base_delay.saturating_mul(factor);

        match kind {
            ErrorKind::Fatal => return RetryDecision::NoRetry,
            ErrorKind::Throttled => delay = delay.saturating_mul(2),
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Http(_)
            | ErrorKind::Storage
            | ErrorKind::Protocol => {}
        }

        RetryDecision::RetryAfter(delay.min(self.max_delay))
    }
}
