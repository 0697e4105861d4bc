//! Types used by the chunk store.

/// Per-file metadata stored next to the chunk list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMeta {
    /// Full size of the remote file, once learned from response headers.
    pub total_size: Option<u64>,
    /// `ETag` of the response the stored chunks came from.
    pub etag: Option<String>,
    /// `Last-Modified` of the response the stored chunks came from.
    pub last_modified: Option<String>,
}

impl FileMeta {
    pub fn with_total(total_size: u64) -> Self {
        Self {
            total_size: Some(total_size),
            ..Self::default()
        }
    }
}

/// Summary view used by `restore` and the CLI `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransfer {
    pub file_name: String,
    pub downloaded: u64,
    pub total_size: Option<u64>,
}

impl StoredTransfer {
    /// Percentage of the file already stored, if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total_size {
            Some(0) => Some(100.0),
            Some(total) => Some((self.downloaded as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }

    /// Every byte is stored; only assembly and delivery are left.
    pub fn is_complete(&self) -> bool {
        matches!(self.total_size, Some(total) if self.downloaded >= total)
    }
}

/// Local persistence failure. Treated as transient by the engine's retry loop.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
