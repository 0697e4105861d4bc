//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves one body for every path. Responds to HEAD with Content-Length and
//! Accept-Ranges: bytes; responds to GET with Range with 206 Partial Content.
//! Failure modes (blocked HEAD, ignored ranges, hidden lengths, forced statuses,
//! dropped or stalled connections, misaligned ranges, slow bodies, ETag
//! changes) are switched on through
//! [`RangeServerOptions`]. Every request is recorded for assertions.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// The first `fail_first_gets` GETs are answered with `fail_status` and no body.
    pub fail_first_gets: usize,
    pub fail_status: u16,
    /// If true, HEAD omits Content-Length and 206 answers report `/*` as total.
    pub unknown_length: bool,
    /// The first GET that carries a body sends only this many bytes, then closes.
    pub drop_after: Option<usize>,
    /// How long the truncated response from `drop_after` stays open before closing.
    pub hold_open: Duration,
    /// The first ranged GET starting past 0 is answered this many bytes early.
    pub misalign_first_range: Option<u64>,
    /// Body is written in pieces of this size with `chunk_delay` in between.
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            fail_first_gets: 0,
            fail_status: 500,
            unknown_length: false,
            drop_after: None,
            hold_open: Duration::ZERO,
            misalign_first_range: None,
            chunk_size: 16 * 1024,
            chunk_delay: Duration::ZERO,
        }
    }
}

/// One received request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Start of `Range: bytes=<start>-<end>`, if the request had one.
    pub range_start: Option<u64>,
}

struct Shared {
    body: Mutex<Vec<u8>>,
    etag: Mutex<Option<String>>,
    log: Mutex<Vec<Request>>,
    gets: AtomicUsize,
    dropped: AtomicUsize,
    misaligned: AtomicUsize,
    opts: RangeServerOptions,
}

/// Handle to a running server. The server runs until the process exits.
#[derive(Clone)]
pub struct RangeServer {
    /// e.g. "http://127.0.0.1:12345/"
    pub base_url: String,
    shared: Arc<Shared>,
}

impl RangeServer {
    pub fn requests(&self) -> Vec<Request> {
        self.shared.log.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .collect()
    }

    /// Replace the served file; subsequent responses carry `etag`.
    pub fn replace_body(&self, body: Vec<u8>, etag: &str) {
        *self.shared.body.lock().unwrap() = body;
        *self.shared.etag.lock().unwrap() = Some(etag.to_string());
    }

    pub fn set_etag(&self, etag: &str) {
        *self.shared.etag.lock().unwrap() = Some(etag.to_string());
    }
}

/// Starts a server in a background thread serving `body`.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior (HEAD blocked, ranges missing, etc.).
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let shared = Arc::new(Shared {
        body: Mutex::new(body),
        etag: Mutex::new(None),
        log: Mutex::new(Vec::new()),
        gets: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
        misaligned: AtomicUsize::new(0),
        opts,
    });
    let accept_shared = Arc::clone(&shared);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let shared = Arc::clone(&accept_shared);
            thread::spawn(move || handle(stream, &shared));
        }
    });
    RangeServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        shared,
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    }
    String::from_utf8(buf).ok()
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    let (method, path, range) = parse_request(&request);
    shared.log.lock().unwrap().push(Request {
        method: method.to_string(),
        path: path.to_string(),
        range_start: range.map(|(start, _)| start),
    });

    let opts = shared.opts;
    let body = shared.body.lock().unwrap().clone();
    let etag = shared.etag.lock().unwrap().clone();
    let total = body.len() as u64;
    let etag_header = etag
        .map(|e| format!("ETag: \"{}\"\r\n", e))
        .unwrap_or_default();
    let accept_ranges = if opts.support_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(
                b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
        let length = if opts.unknown_length {
            String::new()
        } else {
            format!("Content-Length: {}\r\n", total)
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\n{}{}{}Connection: close\r\n\r\n",
            length, accept_ranges, etag_header
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(
            b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    // Zero-length probes (`bytes=0-0`) are not counted as download attempts.
    let is_probe = range == Some((0, 0));
    if !is_probe {
        let n = shared.gets.fetch_add(1, Ordering::SeqCst);
        if n < opts.fail_first_gets {
            let response = format!(
                "HTTP/1.1 {} Forced Failure\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                opts.fail_status
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
    }

    let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                ("416 Range Not Satisfiable", Some(format!("bytes */{}", total)), &body[0..0])
            } else {
                let mut start = start;
                if let Some(shift) = opts.misalign_first_range {
                    if start > 0 && shared.misaligned.fetch_add(1, Ordering::SeqCst) == 0 {
                        start = start.saturating_sub(shift);
                    }
                }
                let end_excl = (end_incl + 1) as usize;
                let shown_total = if opts.unknown_length {
                    "*".to_string()
                } else {
                    total.to_string()
                };
                (
                    "206 Partial Content",
                    Some(format!("bytes {}-{}/{}", start, end_incl, shown_total)),
                    &body[start as usize..end_excl],
                )
            }
        }
        None => ("200 OK", None, &body[..]),
    };
    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        content_range,
        accept_ranges,
        etag_header
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return;
    }

    let mut send = slice;
    let mut truncated = false;
    if !slice.is_empty() && !is_probe {
        if let Some(limit) = opts.drop_after {
            if shared.dropped.fetch_add(1, Ordering::SeqCst) == 0 {
                send = &slice[..limit.min(slice.len())];
                truncated = true;
            }
        }
    }
    for piece in send.chunks(opts.chunk_size.max(1)) {
        if stream.write_all(piece).is_err() {
            return;
        }
        let _ = stream.flush();
        if !opts.chunk_delay.is_zero() {
            thread::sleep(opts.chunk_delay);
        }
    }
    let _ = stream.flush();
    if truncated && !opts.hold_open.is_zero() {
        thread::sleep(opts.hold_open);
    }
    let _ = stream.shutdown(Shutdown::Both);
}

/// Returns (method, path, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, &str, Option<(u64, u64)>) {
    let mut method = "";
    let mut path = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            let mut parts = line.split_whitespace();
            method = parts.next().unwrap_or("");
            path = parts.next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if value.to_lowercase().starts_with("bytes=") {
                    let part = value[6..].trim();
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, path, range)
}
