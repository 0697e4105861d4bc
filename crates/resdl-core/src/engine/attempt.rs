//! One download attempt: size, resume offset, ranged request, chunk streaming.

use futures_util::{Stream, StreamExt};
use reqwest::{header, StatusCode};
use std::future::Future;
use std::time::Duration;

use super::run::{with_estimator, SharedEstimator};
use super::Inner;
use crate::chunk_store::{ChunkStore, FileMeta};
use crate::control::TransferController;
use crate::fetch_head::{parse_content_range, parse_headers, probe};
use crate::retry::TransferError;
use crate::safe_resume::validate_for_resume;

/// Race `fut` against pause/cancel so a pending request is dropped, not awaited.
async fn abortable<T, E, F>(controller: &TransferController, fut: F) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<TransferError>,
{
    tokio::select! {
        biased;
        _ = controller.cancelled() => Err(controller.aborted_error().into()),
        res = fut => res.map_err(Into::into),
    }
}

/// Next body chunk, bounded by the idle timeout.
async fn next_chunk<S, B>(stream: &mut S, idle: Option<Duration>) -> Result<Option<B>, TransferError>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
{
    let next = match idle {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| TransferError::Timeout(limit))?,
        None => stream.next().await,
    };
    next.transpose().map_err(TransferError::from)
}

/// Runs one attempt. On success every byte is stored and the returned value is
/// the total the finalizer should expect.
pub(super) async fn run_attempt(
    inner: &Inner,
    file: &str,
    controller: &TransferController,
    estimator: &SharedEstimator,
) -> Result<Option<u64>, TransferError> {
    let store = inner.store.as_ref();
    let url = inner.cfg.file_url(file);

    let meta = match store.read_meta(file).await? {
        Some(meta) if meta.total_size.is_some() => meta,
        stored => {
            let head = abortable(controller, probe(&inner.client, url.as_str())).await?;
            let stored = stored.unwrap_or_default();
            let meta = FileMeta {
                total_size: head.content_length,
                etag: head.etag.or(stored.etag),
                last_modified: head.last_modified.or(stored.last_modified),
            };
            store.save_meta(file, &meta).await?;
            tracing::debug!(file, total = ?meta.total_size, "probed size");
            meta
        }
    };
    with_estimator(estimator, |e| e.set_total(meta.total_size));

    let mut offset = store.sum_chunk_bytes(file).await?;
    with_estimator(estimator, |e| e.observe(offset));
    if let Some(total) = meta.total_size {
        if offset >= total {
            tracing::debug!(file, offset, total, "all bytes already stored");
            return Ok(Some(total));
        }
    }

    let mut request = inner.client.get(url.clone());
    if offset > 0 {
        request = request.header(header::RANGE, format!("bytes={offset}-"));
    }
    let response = abortable(controller, request.send()).await?;
    let status = response.status();
    let validators = parse_headers(response.headers());
    let content_range = response
        .headers()
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range);
    tracing::debug!(file, offset, status = status.as_u16(), "response");

    // Validators describing the remote file as the server sees it now.
    let remote = FileMeta {
        total_size: match status {
            StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => {
                content_range.and_then(|r| r.total)
            }
            _ => validators.content_length,
        },
        etag: validators.etag,
        last_modified: validators.last_modified,
    };
    let resuming = offset > 0
        && matches!(
            status,
            StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE
        );
    if resuming {
        if let Err(e) = validate_for_resume(&meta, &remote) {
            tracing::warn!(file, offset, "{}", e);
            if inner.cfg.restart_on_remote_change {
                store.purge(file).await?;
                return Err(TransferError::RemoteChanged { purged: true });
            }
            return Err(TransferError::RemoteChanged { purged: false });
        }
    }

    let mut total = meta.total_size;
    match status {
        StatusCode::PARTIAL_CONTENT => {
            let start = content_range.and_then(|r| r.start).unwrap_or(0);
            if start != offset {
                return Err(TransferError::UnexpectedRange {
                    requested: offset,
                    got: start,
                });
            }
            if offset == 0 || total.is_none() {
                total = remote.total_size.or(total);
            }
        }
        StatusCode::OK => {
            if offset > 0 {
                tracing::info!(file, offset, "server ignored range request; restarting from zero");
                store.clear_chunks(file).await?;
                offset = 0;
                with_estimator(estimator, |e| e.observe(0));
            }
            total = remote.total_size.or(total);
        }
        StatusCode::RANGE_NOT_SATISFIABLE if offset > 0 => {
            let complete_at = match (remote.total_size, total) {
                (Some(n), _) if offset >= n => n,
                (None, None) => offset,
                _ => return Err(TransferError::Http(status.as_u16())),
            };
            if total != Some(complete_at) {
                store
                    .save_meta(
                        file,
                        &FileMeta {
                            total_size: Some(complete_at),
                            ..meta
                        },
                    )
                    .await?;
            }
            tracing::debug!(file, offset, "range not satisfiable; stored data is complete");
            return Ok(Some(complete_at));
        }
        s => return Err(TransferError::Http(s.as_u16())),
    }

    // Validators of the response the stored bytes now come from.
    let fresh = if offset == 0 {
        FileMeta {
            total_size: total,
            etag: remote.etag.or(meta.etag.clone()),
            last_modified: remote.last_modified.or(meta.last_modified.clone()),
        }
    } else {
        FileMeta {
            total_size: total,
            ..meta.clone()
        }
    };
    if fresh != meta {
        store.save_meta(file, &fresh).await?;
    }
    with_estimator(estimator, |e| e.set_total(total));

    let mut stored = offset;
    let streamed = stream_body(inner, file, controller, estimator, response, total, &mut stored).await;
    if let Err(err) = streamed {
        // A gap left by this attempt must not be resumed as if it were data.
        return match ensure_contiguous(store, file, stored).await {
            Ok(_) => Err(err),
            Err(check) if err.is_aborted() => {
                tracing::debug!(file, "after abort: {}", check);
                Err(err)
            }
            Err(check) => Err(check),
        };
    }

    let received = ensure_contiguous(store, file, stored).await?;
    match total {
        Some(expected) if received >= expected => Ok(Some(expected)),
        Some(expected) => Err(TransferError::Protocol { expected, received }),
        None => {
            store
                .save_meta(
                    file,
                    &FileMeta {
                        total_size: Some(received),
                        ..fresh
                    },
                )
                .await?;
            with_estimator(estimator, |e| e.set_total(Some(received)));
            Ok(Some(received))
        }
    }
}

/// Streams the response body into the store. `stored` tracks the byte offset
/// the next chunk belongs at, including on error.
async fn stream_body(
    inner: &Inner,
    file: &str,
    controller: &TransferController,
    estimator: &SharedEstimator,
    response: reqwest::Response,
    total: Option<u64>,
    stored: &mut u64,
) -> Result<(), TransferError> {
    let store = inner.store.as_ref();
    let stream = response.bytes_stream();
    futures_util::pin_mut!(stream);
    loop {
        let next = tokio::select! {
            biased;
            _ = controller.cancelled() => return Err(controller.aborted_error().into()),
            next = next_chunk(&mut stream, inner.cfg.idle_timeout) => next?,
        };
        let Some(chunk) = next else {
            return Ok(());
        };
        controller.check()?;

        let mut data: &[u8] = &chunk;
        if let Some(total) = total {
            let room = total.saturating_sub(*stored);
            if room == 0 {
                tracing::debug!(file, "server sent more than the expected total; discarding");
                return Ok(());
            }
            if (data.len() as u64) > room {
                data = &data[..room as usize];
            }
        }
        if data.is_empty() {
            continue;
        }
        store.append_chunk(file, data).await?;
        *stored += data.len() as u64;
        let observed = *stored;
        with_estimator(estimator, |e| e.observe(observed));
    }
}

/// Checks that the store holds exactly the `expected` bytes this attempt
/// accounted for. Chunks removed behind the transfer's back (another process
/// purging the shared database, for one) would leave a gap before the newer
/// chunks, so the whole file is cleared and the next attempt starts at zero.
async fn ensure_contiguous(
    store: &dyn ChunkStore,
    file: &str,
    expected: u64,
) -> Result<u64, TransferError> {
    let found = store.sum_chunk_bytes(file).await?;
    if found != expected {
        tracing::warn!(file, expected, found, "stored chunks changed during transfer; restarting from zero");
        store.clear_chunks(file).await?;
        return Err(TransferError::StoreDiverged { expected, found });
    }
    Ok(found)
}
