//! Engine settings derived from [`ResdlConfig`].

use std::time::Duration;
use url::Url;

use crate::config::ResdlConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Server root; files live under `{base_url}/files/{name}`.
    pub base_url: Url,
    pub retry: RetryPolicy,
    /// Cadence of progress snapshots.
    pub progress_interval: Duration,
    /// Longest wait for the next body chunk; None disables the check.
    pub idle_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub restart_on_remote_change: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
    #[error("invalid server URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server URL {0:?} cannot carry a path")]
    NotABase(String),
}

impl EngineConfig {
    /// Defaults for everything but the server.
    pub fn new(base_url: Url) -> Result<Self, EngineConfigError> {
        Self::from_config_with_url(&ResdlConfig::default(), base_url)
    }

    pub fn from_config(cfg: &ResdlConfig) -> Result<Self, EngineConfigError> {
        let base_url = Url::parse(&cfg.server_url).map_err(|source| EngineConfigError::InvalidUrl {
            url: cfg.server_url.clone(),
            source,
        })?;
        Self::from_config_with_url(cfg, base_url)
    }

    fn from_config_with_url(cfg: &ResdlConfig, base_url: Url) -> Result<Self, EngineConfigError> {
        if base_url.cannot_be_a_base() {
            return Err(EngineConfigError::NotABase(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            retry: cfg
                .retry
                .as_ref()
                .map(RetryPolicy::from_config)
                .unwrap_or_default(),
            progress_interval: Duration::from_millis(cfg.progress_interval_ms.max(10)),
            idle_timeout: (cfg.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.idle_timeout_secs)),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            restart_on_remote_change: cfg.restart_on_remote_change,
        })
    }

    /// `{base_url}/files/{name}` with `name` percent-encoded as one path segment.
    pub fn file_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("files").push(name);
        }
        url
    }
}
