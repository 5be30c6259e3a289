//! Configuration Management
//!
//! Handles persistent engine configuration for tarm. Every field carries a
//! serde default, so a partial or missing file yields a working engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::ProvisioningMode;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Deliveries beyond this count route the job to the dead-letter queue
    pub max_redeliveries: u32,
    /// Idle sleep between polls of an empty queue
    pub poll_interval_ms: u64,
    /// Unread results older than this are purged
    pub result_ttl_secs: u64,
    /// JSON journal for durable queues; in-memory when unset
    pub journal_path: Option<PathBuf>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: 3,
            poll_interval_ms: 100,
            result_ttl_secs: 3600,
            journal_path: None,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub count: usize,
    /// Attempts per delivery, including the first
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON document backing all resource types; in-memory when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub mode: ProvisioningMode,
    pub track_history: bool,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            mode: ProvisioningMode::Synchronous,
            track_history: true,
        }
    }
}

impl EngineConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tarm").join("config.json"))
    }

    /// Load configuration from the user config dir, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }
}
