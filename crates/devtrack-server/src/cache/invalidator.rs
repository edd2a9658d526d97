//! Explicit cache invalidation after writes.

use devtrack_core::models::ResourceKind;
use tracing::debug;

use super::client::CacheClient;
use super::keys::{self, Tier};

#[derive(Clone)]
pub struct CacheInvalidator {
    cache: CacheClient,
}

impl CacheInvalidator {
    pub fn new(cache: CacheClient) -> Self {
        Self { cache }
    }

    /// Delete exactly one key. Returns the number removed.
    pub async fn invalidate_key(&self, key: &str) -> usize {
        self.cache.delete(key).await
    }

    /// Delete every key matching a Redis glob pattern. Zero is not an error.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.cache.delete_pattern(pattern).await
    }

    /// After a write to a collection: the collection read, its tiered reads
    /// and the dashboard that summarises it.
    pub async fn invalidate_resource(&self, kind: ResourceKind, user_id: &str) -> usize {
        let removed = self.invalidate_key(&keys::collection(kind, user_id)).await
            + self
                .invalidate_pattern(&keys::collection_tiers_pattern(kind, user_id))
                .await
            + self.invalidate_key(&keys::dashboard(user_id)).await;
        debug!(%kind, user_id, removed, "Invalidated collection caches");
        removed
    }

    /// After an activity event for today or another recent day.
    pub async fn invalidate_activity_recent(&self, user_id: &str) -> usize {
        self.invalidate_key(&keys::activity(Tier::Recent, user_id)).await
            + self.invalidate_key(&keys::stats(user_id)).await
            + self.invalidate_key(&keys::dashboard(user_id)).await
    }

    /// After a backdated event that lands in the historical tier.
    pub async fn invalidate_activity_all(&self, user_id: &str) -> usize {
        self.invalidate_key(&keys::activity(Tier::Historical, user_id)).await
            + self.invalidate_activity_recent(user_id).await
    }

    /// Bulk data clear: every key owned by the user.
    pub async fn invalidate_user(&self, user_id: &str) -> usize {
        let removed = self.invalidate_pattern(&keys::user_pattern(user_id)).await;
        debug!(user_id, removed, "Invalidated all user caches");
        removed
    }
}
