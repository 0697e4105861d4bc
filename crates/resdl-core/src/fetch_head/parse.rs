//! Parse HTTP response headers into HeadResult and Content-Range values.

use reqwest::header::{self, HeaderMap};

use super::HeadResult;

/// Parsed `Content-Range: bytes <start>-<end>/<total>` value.
/// `bytes */<total>` (416 responses) has no start/end; `/*` has no total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub total: Option<u64>,
}

/// Parse the key headers of a response into HeadResult.
pub fn parse_headers(headers: &HeaderMap) -> HeadResult {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    };

    HeadResult {
        content_length: text(header::CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok()),
        accept_ranges: text(header::ACCEPT_RANGES)
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false),
        etag: text(header::ETAG).map(|v| v.trim_matches('"').to_string()),
        last_modified: text(header::LAST_MODIFIED),
    }
}

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let value = value.trim();
    let rest = value
        .get(..6)
        .filter(|p| p.eq_ignore_ascii_case("bytes "))
        .map(|_| value[6..].trim())?;
    let (range, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let (start, end) = match range.trim() {
        "*" => (None, None),
        r => {
            let (a, b) = r.split_once('-')?;
            (Some(a.trim().parse().ok()?), Some(b.trim().parse().ok()?))
        }
    };
    Some(ContentRange { start, end, total })
}
