use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration loaded from `~/.config/muxd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxdConfig {
    /// TCP port the HTTP server listens on.
    pub http_port: u16,
    /// Maximum concurrently-open inbound connections; 0 means unbounded.
    pub max_connections: u16,
    /// Maximum simultaneous outbound fetches per request.
    pub max_fetch_connections: u16,
    /// Maximum number of URLs accepted in one request.
    pub max_urls_per_request: usize,
    /// Timeout per outbound fetch in seconds (e.g. 1.5 = 1500ms).
    pub fetch_timeout_secs: f64,
    /// Delay before shutdown starts closing the server, letting in-flight
    /// traffic finish arriving.
    pub graceful_delay_secs: u64,
    /// Budget for the server to finish in-flight requests on shutdown.
    pub graceful_timeout_secs: u64,
}

impl Default for MuxdConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            max_connections: 100,
            max_fetch_connections: 4,
            max_urls_per_request: 20,
            fetch_timeout_secs: 1.0,
            graceful_delay_secs: 3,
            graceful_timeout_secs: 3,
        }
    }
}

impl MuxdConfig {
    /// Per-fetch timeout as a `Duration`.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_timeout_secs.max(0.0))
    }

    /// Graceful-drain delay as a `Duration`.
    pub fn graceful_delay(&self) -> Duration {
        Duration::from_secs(self.graceful_delay_secs)
    }

    /// Graceful-shutdown budget as a `Duration`.
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("muxd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from the default XDG path, creating a default file if
/// none exists.
pub fn load_or_init() -> Result<MuxdConfig> {
    load_or_init_at(&config_path()?)
}

/// Load configuration from `path`, creating a default file there if none
/// exists.
pub fn load_or_init_at(path: &Path) -> Result<MuxdConfig> {
    if !path.exists() {
        let default_cfg = MuxdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: MuxdConfig = toml::from_str(&data)?;
    Ok(cfg)
}
