use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Backoff growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    /// `attempt * base_delay`.
    #[default]
    Linear,
    /// `base_delay * 2^(attempt-1)`.
    Exponential,
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per transfer (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for backoff (e.g. 1.0 = 1000ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Linear (default) or exponential backoff.
    #[serde(default)]
    pub backoff: BackoffMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
            backoff: BackoffMode::Linear,
        }
    }
}

/// Global configuration loaded from `~/.config/resdl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResdlConfig {
    /// Base URL of the file server; files are fetched from `{server_url}/files/{name}`.
    pub server_url: String,
    /// Directory finished files are delivered to (None = current directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Cadence of progress snapshots in milliseconds.
    pub progress_interval_ms: u64,
    /// Give up on a stalled response after this many seconds without a chunk (0 = never).
    pub idle_timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Discard stored chunks and start over when the remote ETag/Last-Modified changed.
    pub restart_on_remote_change: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ResdlConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            download_dir: None,
            progress_interval_ms: 250,
            idle_timeout_secs: 60,
            connect_timeout_secs: 10,
            restart_on_remote_change: true,
            retry: None,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("resdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ResdlConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<ResdlConfig> {
    if !path.exists() {
        let default_cfg = ResdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: ResdlConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ResdlConfig::default();
        assert_eq!(cfg.server_url, "http://localhost:8080");
        assert_eq!(cfg.progress_interval_ms, 250);
        assert_eq!(cfg.idle_timeout_secs, 60);
        assert!(cfg.restart_on_remote_change);
        assert!(cfg.retry.is_none());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ResdlConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ResdlConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server_url, cfg.server_url);
        assert_eq!(parsed.progress_interval_ms, cfg.progress_interval_ms);
        assert_eq!(parsed.connect_timeout_secs, cfg.connect_timeout_secs);
    }

    #[test]
    fn config_toml_retry_section() {
        let toml = r#"
            server_url = "http://files.internal:9000"
            progress_interval_ms = 100
            idle_timeout_secs = 0
            connect_timeout_secs = 5
            restart_on_remote_change = false
            download_dir = "/tmp/out"

            [retry]
            max_attempts = 3
            base_delay_secs = 0.5
            max_delay_secs = 15
            backoff = "exponential"
        "#;
        let cfg: ResdlConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.server_url, "http://files.internal:9000");
        assert_eq!(cfg.download_dir.as_deref(), Some(Path::new("/tmp/out")));
        assert!(!cfg.restart_on_remote_change);
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert!((retry.base_delay_secs - 0.5).abs() < 1e-9);
        assert_eq!(retry.max_delay_secs, 15);
        assert_eq!(retry.backoff, BackoffMode::Exponential);
    }

    #[test]
    fn retry_backoff_defaults_to_linear() {
        let toml = r#"
            max_attempts = 4
            base_delay_secs = 1.0
            max_delay_secs = 10
        "#;
        let retry: RetryConfig = toml::from_str(toml).unwrap();
        assert_eq!(retry.backoff, BackoffMode::Linear);
    }

    #[test]
    fn load_or_init_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = load_or_init_at(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.server_url, ResdlConfig::default().server_url);

        fs::write(
            &path,
            "server_url = \"http://x\"\nprogress_interval_ms = 50\nidle_timeout_secs = 1\n\
             connect_timeout_secs = 1\nrestart_on_remote_change = true\n",
        )
        .unwrap();
        let cfg = load_or_init_at(&path).unwrap();
        assert_eq!(cfg.server_url, "http://x");
        assert_eq!(cfg.progress_interval_ms, 50);
    }
}
