//! Client configuration management.
//!
//! Holds the server URL, the acting user id and sync tuning. Stored at
//! `~/.config/devtrack/config.json`; `DEVTRACK_API_URL` and `DEVTRACK_USER`
//! override the file (a `.env` file is honoured by the binaries).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::SnapshotCache;
use crate::sync::DEFAULT_DEBOUNCE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "devtrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub api_base_url: Option<String>,
    pub user_id: Option<String>,
    pub debounce_ms: Option<u64>,
    pub snapshot_ttl_secs: Option<u64>,
    /// Overrides the platform cache directory for snapshots
    pub snapshot_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Snapshot directory, one subdirectory per user
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let mut path = match &self.snapshot_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?
                .join(APP_NAME),
        };
        if let Some(user) = self.user() {
            path = path.join(user);
        }
        Ok(path)
    }

    pub fn api_base_url(&self) -> String {
        std::env::var("DEVTRACK_API_URL")
            .ok()
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn user(&self) -> Option<String> {
        std::env::var("DEVTRACK_USER")
            .ok()
            .or_else(|| self.user_id.clone())
    }

    pub fn debounce(&self) -> Duration {
        self.debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE)
    }

    /// Snapshot staleness window in milliseconds, if overridden
    pub fn snapshot_ttl_ms(&self) -> Option<i64> {
        self.snapshot_ttl_secs
            .map(|secs| i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX))
    }

    /// Open the snapshot cache in [`Config::cache_dir`], creating it if needed.
    pub fn snapshot_cache(&self) -> Result<SnapshotCache> {
        let cache = SnapshotCache::new(self.cache_dir()?)?;
        Ok(match self.snapshot_ttl_ms() {
            Some(ttl_ms) => cache.with_ttl_ms(ttl_ms),
            None => cache,
        })
    }
}
