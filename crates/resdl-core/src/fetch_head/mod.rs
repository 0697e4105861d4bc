//! HTTP HEAD / metadata probing.
//!
//! Learns the total size of a remote file before streaming, and captures
//! ETag/Last-Modified for resume safety. Servers that block HEAD (or omit
//! `Content-Length`) are probed with a zero-length ranged GET instead, reading
//! the total from `Content-Range`.

mod parse;

pub use parse::{parse_content_range, parse_headers, ContentRange};

use reqwest::{header, Client, StatusCode};

use crate::retry::TransferError;

/// Result of a probe: key headers needed for ranged download and resume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    /// Total size in bytes, if the server told us.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// `ETag` value if present (used for resume validation).
    pub etag: Option<String>,
    /// `Last-Modified` value if present (used for resume validation).
    pub last_modified: Option<String>,
}

/// Probes `url` for its size and validators.
///
/// Tries HEAD first; if HEAD fails or carries no length, falls back to
/// `GET` with `Range: bytes=0-0`. Only when both fail is an error returned.
pub async fn probe(client: &Client, url: &str) -> Result<HeadResult, TransferError> {
    let head_err = match head(client, url).await {
        Ok(result) if result.content_length.is_some() => return Ok(result),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(url, "HEAD probe failed: {}", e);
            Some(e)
        }
    };

    match range_probe(client, url).await {
        Ok(result) => Ok(result),
        Err(e) => Err(head_err.unwrap_or(e)),
    }
}

async fn head(client: &Client, url: &str) -> Result<HeadResult, TransferError> {
    let resp = client.head(url).send().await?;
    if !resp.status().is_success() {
        return Err(TransferError::Http(resp.status().as_u16()));
    }
    Ok(parse_headers(resp.headers()))
}

async fn range_probe(client: &Client, url: &str) -> Result<HeadResult, TransferError> {
    let resp = client
        .get(url)
        .header(header::RANGE, "bytes=0-0")
        .send()
        .await?;
    let status = resp.status();
    let mut result = parse_headers(resp.headers());
    match status {
        StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => {
            result.accept_ranges = true;
            result.content_length = resp
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
                .and_then(|r| r.total);
        }
        s if s.is_success() => {
            // Range ignored: Content-Length is the full body. The body is dropped unread.
        }
        s => return Err(TransferError::Http(s.as_u16())),
    }
    Ok(result)
}
