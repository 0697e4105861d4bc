//! Transfer task: retry loop, progress ticker and final state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::state::TransferState;
use super::{attempt, Inner};
use crate::control::{AbortReason, TransferController};
use crate::progress::{ProgressEstimator, ProgressSnapshot};
use crate::retry::{classify, RetryDecision, TransferError};

pub(super) type SharedEstimator = Arc<Mutex<ProgressEstimator>>;

pub(super) fn with_estimator<R>(est: &SharedEstimator, f: impl FnOnce(&mut ProgressEstimator) -> R) -> R {
    f(&mut est.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Marks the transfer as failed if the task is dropped before recording a
/// final state (panic or aborted JoinHandle). Stored chunks stay, so the last
/// known progress is kept.
struct FinishGuard {
    inner: Arc<Inner>,
    file: String,
    generation: u64,
    estimator: Option<SharedEstimator>,
    stop_ticker: Option<CancellationToken>,
    armed: bool,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if let Some(stop) = &self.stop_ticker {
            stop.cancel();
        }
        if self.armed {
            tracing::error!(file = %self.file, "transfer task ended without a final state");
            let snapshot = self
                .estimator
                .as_ref()
                .map(|est| with_estimator(est, |e| e.snapshot()))
                .unwrap_or_default();
            self.inner.finish(
                &self.file,
                self.generation,
                TransferState::Error,
                snapshot,
                Some("transfer task ended unexpectedly".to_string()),
            );
        }
    }
}

pub(super) async fn run_transfer(
    inner: Arc<Inner>,
    file: String,
    controller: Arc<TransferController>,
    generation: u64,
) -> TransferState {
    let mut guard = FinishGuard {
        inner: inner.clone(),
        file: file.clone(),
        generation,
        estimator: None,
        stop_ticker: None,
        armed: true,
    };

    // Baseline is what is already stored, not zero.
    let (downloaded, total) = match inner.store.stored_transfer(&file).await {
        Ok(Some(stored)) => (stored.downloaded, stored.total_size),
        Ok(None) => (0, None),
        Err(e) => {
            tracing::warn!(file = %file, "could not read stored progress: {}", e);
            (0, None)
        }
    };
    let estimator: SharedEstimator = Arc::new(Mutex::new(ProgressEstimator::new(downloaded, total)));
    guard.estimator = Some(estimator.clone());
    inner.publish_progress(&file, with_estimator(&estimator, |e| e.snapshot()));

    let stop_ticker = controller.child_token();
    guard.stop_ticker = Some(stop_ticker.clone());
    let ticker = tokio::spawn(run_ticker(
        inner.clone(),
        file.clone(),
        estimator.clone(),
        stop_ticker.clone(),
        inner.cfg.progress_interval,
    ));

    let outcome = download_with_retry(&inner, &file, &controller, &estimator).await;
    stop_ticker.cancel();
    let _ = ticker.await;

    let (state, snapshot, error) = match outcome {
        Ok(()) => {
            tracing::info!(file = %file, "transfer completed");
            (
                TransferState::Completed,
                with_estimator(&estimator, |e| e.complete()),
                None,
            )
        }
        Err(TransferError::Aborted(aborted)) => match aborted.reason {
            AbortReason::Pause => {
                tracing::info!(file = %file, "transfer paused");
                (
                    TransferState::Paused,
                    with_estimator(&estimator, |e| e.snapshot()),
                    None,
                )
            }
            AbortReason::Cancel => {
                if let Err(e) = inner.store.purge(&file).await {
                    tracing::warn!(file = %file, "purge after cancel failed: {}", e);
                }
                (TransferState::Idle, ProgressSnapshot::default(), None)
            }
        },
        Err(e) => {
            tracing::error!(file = %file, "transfer failed: {}", e);
            (
                TransferState::Error,
                with_estimator(&estimator, |est| est.snapshot()),
                Some(e.to_string()),
            )
        }
    };

    guard.armed = false;
    inner.finish(&file, generation, state, snapshot, error);
    state
}

/// Runs attempts until the file is finalized, the user aborts, or the retry
/// policy gives up. Stored chunks are kept on failure.
async fn download_with_retry(
    inner: &Inner,
    file: &str,
    controller: &TransferController,
    estimator: &SharedEstimator,
) -> Result<(), TransferError> {
    let policy = inner.cfg.retry;
    let mut attempt = 1u32;
    loop {
        controller.check()?;
        let err = match attempt::run_attempt(inner, file, controller, estimator).await {
            Ok(expected) => {
                inner.finalizer.finalize(file, expected).await?;
                return Ok(());
            }
            Err(e) => e,
        };
        if err.is_aborted() {
            return Err(err);
        }
        // A dropped connection can surface as a network error after pause/cancel.
        if controller.is_aborted() {
            return Err(controller.aborted_error().into());
        }

        let kind = classify(&err);
        match policy.decide(attempt, kind) {
            RetryDecision::NoRetry => {
                tracing::warn!(file, attempt, ?kind, "giving up: {}", err);
                return Err(err);
            }
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    file,
                    attempt,
                    ?kind,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying: {}",
                    err
                );
                tokio::select! {
                    _ = controller.cancelled() => return Err(controller.aborted_error().into()),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

async fn run_ticker(
    inner: Arc<Inner>,
    file: String,
    estimator: SharedEstimator,
    stop: CancellationToken,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick completes immediately; the initial snapshot is already published.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let snapshot = with_estimator(&estimator, |e| e.snapshot());
                inner.publish_progress(&file, snapshot);
            }
        }
    }
}
