//! Read-through helper: serve from cache, otherwise compute and populate.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::client::CacheClient;

impl CacheClient {
    /// Return the cached value for `key`, or run `fetch`, cache its result
    /// for `ttl_secs` and return it.
    ///
    /// An unreadable cached value counts as a miss and is overwritten. A
    /// failed write-back is ignored. Only errors from `fetch` propagate.
    pub async fn get_cached<T, E, F, Fut>(&self, key: &str, ttl_secs: u64, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(raw) = self.get(key).await {
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => debug!(key, error = %e, "Unreadable cache entry, recomputing"),
            }
        }

        let value = fetch().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if self.set(key, &raw, ttl_secs).await {
                    debug!(key, ttl_secs, "Cache populated");
                }
            }
            Err(e) => warn!(key, error = %e, "Could not serialize value for cache"),
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::cache::{CacheStore, MemoryStore};

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::with_store(store.clone());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Vec<u32> = cache
                .get_cached("nums:u1", 60, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.contains("nums:u1"));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store.set_with_ttl("nums:u1", "{not json", 60).await.unwrap();
        let cache = CacheClient::with_store(store.clone());

        let value: Vec<u32> = cache
            .get_cached("nums:u1", 60, || async { Ok::<_, String>(vec![7]) })
            .await
            .unwrap();
        assert_eq!(value, vec![7]);
        assert_eq!(store.get("nums:u1").await.unwrap().as_deref(), Some("[7]"));
        assert!(cache.is_available());
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_and_caches_nothing() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::with_store(store.clone());

        let result: Result<Vec<u32>, String> = cache
            .get_cached("nums:u1", 60, || async { Err("db down".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "db down");
        assert!(store.keys().is_empty());
    }
}
