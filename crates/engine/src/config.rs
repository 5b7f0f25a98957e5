// Engine configuration: `~/.leadflow/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reconciler::{DebounceConfig, ReconcilerConfig};

/// Root directory for Leadflow global state: `~/.leadflow/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".leadflow"))
}

/// Path to the global config file: `~/.leadflow/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Debounce window for reconciliation fetches, in milliseconds.
    pub debounce_ms: u64,
    /// Reconciler poll interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Bounded wait for a durable-write acknowledgment, in milliseconds.
    pub write_timeout_ms: u64,
    /// Listen address for the ingestion endpoint.
    pub ingest_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            poll_interval_ms: 50,
            write_timeout_ms: 3_000,
            ingest_addr: "127.0.0.1:4620".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from `~/.leadflow/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse engine config")
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            debounce: DebounceConfig::with_millis(self.debounce_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
