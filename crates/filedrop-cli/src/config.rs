use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "filedrop.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Frames queued per websocket before relays wait on the writer
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Lifetime of a Files Record from creation
    #[serde(default = "default_files_ttl_secs")]
    pub files_ttl_secs: u64,
    /// How often expired Files Records are purged (0 = never)
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// Change-feed events buffered per subscriber before it lags
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:8900".to_string()
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_files_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_reap_interval_secs() -> u64 {
    300
}

fn default_feed_capacity() -> usize {
    filedrop_core::DEFAULT_FEED_CAPACITY
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            files_ttl_secs: default_files_ttl_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl StoreConfig {
    pub fn files_ttl(&self) -> Duration {
        Duration::from_secs(self.files_ttl_secs)
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        (self.reap_interval_secs > 0).then(|| Duration::from_secs(self.reap_interval_secs))
    }
}

impl Config {
    /// Load config from file, or create default if doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
