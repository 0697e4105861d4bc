//! Progress estimation for one transfer (percentage, bytes, rate, ETA).
//!
//! The engine feeds real stored byte counts through [`ProgressEstimator::observe`]
//! on every chunk; a ticker takes a [`ProgressSnapshot`] on a fixed cadence.
//! Rate is measured over the bytes of the current session only, so a resumed
//! transfer does not report the already-stored prefix as throughput.

use std::time::Instant;

/// Point-in-time view of a transfer (CLI-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressSnapshot {
    /// Percent complete in [0, 100]; None while the total is unknown.
    pub percentage: Option<f64>,
    /// Bytes stored so far, including chunks from earlier sessions.
    pub downloaded: u64,
    pub total: Option<u64>,
    /// Session throughput in bytes per second (0 until bytes arrive).
    pub bytes_per_sec: f64,
    /// Estimated seconds remaining; None if total or rate is unknown.
    pub eta_secs: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    baseline: u64,
    downloaded: u64,
    total: Option<u64>,
    started: Instant,
    published: f64,
}

impl ProgressEstimator {
    /// New estimator whose session starts with `baseline` bytes already stored.
    pub fn new(baseline: u64, total: Option<u64>) -> Self {
        let mut est = Self {
            baseline,
            downloaded: baseline,
            total,
            started: Instant::now(),
            published: 0.0,
        };
        est.published = est.raw_percentage().unwrap_or(0.0);
        est
    }

    /// Record the current stored byte count.
    pub fn observe(&mut self, downloaded: u64) {
        if downloaded < self.baseline {
            // Stored chunks were discarded and the transfer restarted from zero.
            self.baseline = downloaded;
        }
        self.downloaded = downloaded;
    }

    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn snapshot(&mut self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Final snapshot once the transfer finished: exactly 100%.
    pub fn complete(&mut self) -> ProgressSnapshot {
        if self.total.is_none() {
            self.total = Some(self.downloaded);
        }
        self.published = 100.0;
        ProgressSnapshot {
            percentage: Some(100.0),
            downloaded: self.downloaded,
            total: self.total,
            bytes_per_sec: self.rate_at(Instant::now()),
            eta_secs: Some(0.0),
        }
    }

    fn raw_percentage(&self) -> Option<f64> {
        match self.total? {
            0 => Some(100.0),
            total => Some((self.downloaded as f64 / total as f64 * 100.0).min(100.0)),
        }
    }

    fn rate_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let session = self.downloaded.saturating_sub(self.baseline);
        if elapsed <= 0.0 || session == 0 {
            return 0.0;
        }
        session as f64 / elapsed
    }

    pub(crate) fn snapshot_at(&mut self, now: Instant) -> ProgressSnapshot {
        let percentage = self.raw_percentage().map(|p| {
            self.published = self.published.max(p);
            self.published
        });
        let bytes_per_sec = self.rate_at(now);
        let eta_secs = match self.total {
            Some(total) if self.downloaded >= total => Some(0.0),
            Some(total) if bytes_per_sec > 0.0 => {
                Some((total - self.downloaded) as f64 / bytes_per_sec)
            }
            _ => None,
        };
        ProgressSnapshot {
            percentage,
            downloaded: self.downloaded,
            total: self.total,
            bytes_per_sec,
            eta_secs,
        }
    }
}
