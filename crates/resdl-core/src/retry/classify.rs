//! Classify HTTP status, reqwest errors and transfer errors into retry policy error kinds.

use super::error::TransferError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        _ => ErrorKind::Http(code),
    }
}

/// Classify a reqwest error for retry decisions.
pub fn classify_reqwest_error(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        return ErrorKind::Timeout;
    }
    if let Some(status) = e.status() {
        return classify_http_status(status.as_u16());
    }
    if e.is_builder() {
        return ErrorKind::Fatal;
    }
    ErrorKind::Connection
}

/// Classify a transfer error into an ErrorKind.
pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Network(re) => classify_reqwest_error(re),
        TransferError::Http(code) => classify_http_status(*code),
        TransferError::Timeout(_) => ErrorKind::Timeout,
        TransferError::Store(_) => ErrorKind::Storage,
        TransferError::Protocol { .. }
        | TransferError::UnexpectedRange { .. }
        | TransferError::StoreDiverged { .. } => ErrorKind::Protocol,
        TransferError::RemoteChanged { purged: true } => ErrorKind::Protocol,
        TransferError::RemoteChanged { purged: false }
        | TransferError::Aborted(_)
        | TransferError::Finalization(_) => ErrorKind::Fatal,
    }
}
