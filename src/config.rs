//! Monitor configuration.
//!
//! Resolution order: built-in defaults, then an optional YAML file
//! (`$SKYPYDB_MONITOR_CONFIG` or `~/.skypydb/monitor.yaml`), then the
//! `SKYPYDB_API_URL` / `SKYPYDB_POLL_INTERVAL_MS` environment overrides.

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_CONFIG_PATH: &str = "SKYPYDB_MONITOR_CONFIG";
pub const ENV_API_URL: &str = "SKYPYDB_API_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "SKYPYDB_POLL_INTERVAL_MS";

/// Keeps a zero or tiny interval from turning the poller into a busy loop.
const MIN_POLL_INTERVAL_MS: u64 = crate::poller::MIN_POLL_INTERVAL.as_millis() as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Base URL of the SkypyDB API server.
    pub api_url: String,
    pub poll_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub endpoints: EndpointConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub ping: String,
    pub summary: String,
    pub health: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            poll_interval_ms: 2_000,
            probe_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
            endpoints: EndpointConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ping: "/api/health".into(),
            summary: "/api/summary".into(),
            health: "/api/health".into(),
        }
    }
}

impl MonitorConfig {
    /// Load from the default locations and the process environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(path = %path.display(), "No config file — using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injectable for tests).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got {:?}", ENV_POLL_INTERVAL_MS, raw))?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        let url = self.base_url()?;
        if url.port_or_known_default().is_none() {
            bail!("api_url {} has no port", self.api_url);
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            warn!(
                requested_ms = self.poll_interval_ms,
                min_ms = MIN_POLL_INTERVAL_MS,
                "Poll interval too small — clamping"
            );
            self.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_url)
            .with_context(|| format!("api_url is not a valid URL: {}", self.api_url))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => bail!("api_url must be http or https, got {}", other),
        }
    }

    /// Port the backend is expected on, used in the unreachable diagnostic.
    pub fn api_port(&self) -> Option<u16> {
        self.base_url().ok()?.port_or_known_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".skypydb").join("monitor.yaml"))
}
