//! Server configuration from command line flags and environment.
//!
//! Every flag has an environment fallback; a `.env` file is loaded at
//! startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

/// Application name used for the default data directory
const APP_NAME: &str = "devtrack";

const DB_FILE: &str = "devtrack.sqlite3";

#[derive(Debug, Clone, Parser)]
#[command(name = "devtrack-server")]
#[command(about = "Batch sync, read-through cache and activity aggregation for devtrack")]
#[command(version)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "DEVTRACK_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// SQLite database path (defaults to the user data directory)
    #[arg(long, env = "DEVTRACK_DB")]
    pub db: Option<PathBuf>,

    /// REST cache endpoint (Upstash Redis REST protocol)
    #[arg(long, env = "CACHE_REST_URL")]
    pub cache_rest_url: Option<String>,

    /// Bearer token for the REST cache endpoint
    #[arg(long, env = "CACHE_REST_TOKEN", hide_env_values = true)]
    pub cache_rest_token: Option<String>,

    /// Redis URL for a persistent-connection cache
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Use an in-process cache when no external backend is configured
    #[arg(long, env = "DEVTRACK_MEMORY_CACHE")]
    pub memory_cache: bool,

    /// Seconds between health probes of an unavailable cache backend
    #[arg(long, env = "DEVTRACK_CACHE_PROBE_SECS", default_value_t = 30)]
    pub cache_probe_secs: u64,
}

/// Which cache backend to build. Chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendConfig {
    Rest { url: String, token: String },
    Redis { url: String },
    Memory,
    None,
}

impl ServerConfig {
    pub fn db_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.db {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(DB_FILE))
    }

    /// REST wins over Redis, Redis over the in-process cache.
    pub fn cache_backend(&self) -> CacheBackendConfig {
        match (&self.cache_rest_url, &self.cache_rest_token, &self.redis_url) {
            (Some(url), Some(token), _) => CacheBackendConfig::Rest {
                url: url.clone(),
                token: token.clone(),
            },
            (_, _, Some(url)) => CacheBackendConfig::Redis { url: url.clone() },
            _ if self.memory_cache => CacheBackendConfig::Memory,
            _ => CacheBackendConfig::None,
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.cache_probe_secs.max(1))
    }
}
