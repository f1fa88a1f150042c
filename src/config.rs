use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::topology::DEFAULT_PROMOTION_SUFFIX;

/// Configuration file structure for pipegraph.
///
/// Every value can also be given on the command line; flags win over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// GoCD server connection
    #[serde(default)]
    pub gocd: GoCdConfig,

    /// Viewer-facing server
    #[serde(default)]
    pub server: ServerConfig,

    /// Graph building
    #[serde(default)]
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GoCdConfig {
    /// GoCD base URL (e.g. https://gocd.example.com)
    #[serde(default = "default_gocd_base_url")]
    pub base_url: String,

    /// Personal access token, sent as a bearer token
    pub token: Option<String>,

    /// Basic auth username
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on requests in flight against GoCD
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address viewers connect to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Seconds between refresh ticks
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TopologyConfig {
    /// Name suffix of the pipeline that stands in for package dependencies
    #[serde(default = "default_promotion_suffix")]
    pub promotion_suffix: String,
}

impl Default for GoCdConfig {
    fn default() -> Self {
        Self {
            base_url: default_gocd_base_url(),
            token: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            promotion_suffix: default_promotion_suffix(),
        }
    }
}

fn default_gocd_base_url() -> String {
    "http://localhost:8153".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_requests() -> usize {
    32
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_promotion_suffix() -> String {
    DEFAULT_PROMOTION_SUFFIX.to_string()
}

impl GoCdConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl ServerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./pipegraph.toml
    /// 3. ./pipegraph.json
    /// 4. ./pipegraph.yaml
    /// 5. ./pipegraph.yml
    /// 6. <user config dir>/pipegraph/config.toml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "pipegraph.toml",
            "pipegraph.json",
            "pipegraph.yaml",
            "pipegraph.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        if let Some(path) = user_config_path().filter(|p| p.exists()) {
            return Self::load_from_path(&path);
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pipegraph").join("config.toml"))
}
