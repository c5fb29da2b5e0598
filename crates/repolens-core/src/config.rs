//! Configuration loading and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level RepoLens configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the gateway the client submits runs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Seconds without any stream event before the run is treated as a
    /// transport failure. 0 disables the guard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment
/// variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return input.to_string(),
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}`
    /// references. A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::RepoLensError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::RepoLensError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location: `~/.repolens/config.json`
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().and_then(|g| g.port).unwrap_or(8787)
    }

    pub fn base_url(&self) -> String {
        self.client
            .as_ref()
            .and_then(|c| c.base_url.clone())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.gateway_port()))
    }

    /// Idle-stream guard. `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        let secs = self
            .client
            .as_ref()
            .and_then(|c| c.idle_timeout_secs)
            .unwrap_or(120);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Directory for durable conversation storage.
    pub fn store_dir(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.data_dir.as_ref())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir().join("conversations"))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for RepoLens data: `~/.repolens/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".repolens")
}
