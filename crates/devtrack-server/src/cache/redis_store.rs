//! Persistent-connection cache backend over a Redis server.
//!
//! The connection is opened on first use, not at startup. `ConnectionManager`
//! then multiplexes it and reconnects on its own; clones share it. A failed
//! or timed out connect leaves the store unconnected so the next call (or
//! the health probe) tries again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::backend::{CacheError, CacheStore};

/// `COUNT` hint for each `SCAN` page.
pub const SCAN_PAGE_SIZE: usize = 100;

/// Upper bound on establishing the connection, including the manager's own
/// reconnect attempts.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct RedisStore {
    url: Arc<str>,
    conn: Arc<OnceCell<ConnectionManager>>,
    connect_timeout: Duration,
}

impl RedisStore {
    /// Does no I/O. An invalid URL surfaces as an error from the first call.
    pub fn new(url: &str) -> Self {
        Self {
            url: Arc::from(url),
            conn: Arc::new(OnceCell::new()),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.url.as_ref())?;
                let conn = tokio::time::timeout(self.connect_timeout, ConnectionManager::new(client))
                    .await
                    .map_err(|_| CacheError::Timeout(self.connect_timeout))??;
                info!("Connected to Redis cache backend");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs.max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.del(key).await?)
    }

    /// Cursor-based so a large keyspace never blocks the server.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let n: usize = conn.del(&keys).await?;
                removed += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, removed, "Deleted keys by pattern");
        Ok(removed)
    }
}
