//! The key-value contract every cache backend implements.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a cache backend. They never leave `CacheClient`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache backend rejected command: {0}")]
    Backend(String),

    #[error("unexpected cache reply: {0}")]
    Protocol(String),

    #[error("cache backend timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cache backend offline")]
    Offline,
}

/// Prefix of the throwaway key written by health checks
pub const HEALTH_PROBE_PREFIX: &str = "cache-health:probe:";

/// String key-value store with per-key TTLs and Redis glob pattern deletes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name reported by `/cache-health`
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Returns the number of keys removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<usize, CacheError>;

    /// Delete every key matching a Redis glob pattern.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    /// Write, read back and delete a probe key.
    async fn health_check(&self) -> Result<(), CacheError> {
        let key = format!("{}{}", HEALTH_PROBE_PREFIX, uuid::Uuid::new_v4());
        self.set_with_ttl(&key, "ok", 10).await?;
        let value = self.get(&key).await?;
        self.delete(&key).await?;
        match value.as_deref() {
            Some("ok") => Ok(()),
            other => Err(CacheError::Protocol(format!(
                "health probe read back {:?}",
                other
            ))),
        }
    }
}
