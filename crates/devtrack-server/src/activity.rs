//! Activity logging and analytics.
//!
//! Events are folded into per-day summaries transactionally. Heatmap reads
//! are split into two cache tiers: days older than the recent window change
//! only through backdated events and are cached for a day, the recent
//! window for five minutes.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};
use devtrack_core::models::{ActivityStats, ActivitySummary, HeatmapDay};
use tracing::debug;

use crate::cache::keys::{self, Tier};
use crate::cache::{CacheClient, CacheInvalidator};
use crate::store::activity::ActivityEvent;
use crate::store::{Store, StoreError};

/// Days covered by the recent tier.
pub const RECENT_WINDOW_DAYS: i64 = 30;

/// The recent tier reaches this many days past the window so a historical
/// snapshot up to one day old never leaves a gap.
const TIER_OVERLAP_DAYS: i64 = 2;

/// Longest heatmap a caller can request.
pub const MAX_HEATMAP_DAYS: u32 = 730;

pub const DEFAULT_HEATMAP_DAYS: u32 = 365;

#[derive(Clone)]
pub struct ActivityAggregator {
    store: Store,
    cache: CacheClient,
    invalidator: CacheInvalidator,
}

impl ActivityAggregator {
    pub fn new(store: Store, cache: CacheClient) -> Self {
        Self {
            invalidator: CacheInvalidator::new(cache.clone()),
            store,
            cache,
        }
    }

    /// Record one event and return the day's summary after the increment.
    ///
    /// `date` defaults to today (UTC).
    pub async fn log_event(
        &self,
        user_id: &str,
        date: Option<NaiveDate>,
        activity_type: &str,
        description: &str,
    ) -> Result<ActivitySummary, StoreError> {
        let now = Utc::now();
        let today = now.date_naive();
        let date = date.unwrap_or(today);

        let summary = self
            .store
            .record_activity(ActivityEvent {
                user_id: user_id.to_string(),
                date,
                activity_type: activity_type.to_string(),
                description: description.to_string(),
                at: now,
            })
            .await?;

        if date < Self::recent_start(today) {
            self.invalidator.invalidate_activity_all(user_id).await;
        } else {
            self.invalidator.invalidate_activity_recent(user_id).await;
        }

        debug!(user_id, %date, activity_type, count = summary.count, "Logged activity");
        Ok(summary)
    }

    fn recent_start(today: NaiveDate) -> NaiveDate {
        today - Duration::days(RECENT_WINDOW_DAYS - 1)
    }

    /// One cell per day for the last `days` days ending `today`, oldest
    /// first. Days without activity have a zero count.
    pub async fn heatmap(
        &self,
        user_id: &str,
        days: u32,
        today: NaiveDate,
    ) -> Result<Vec<HeatmapDay>, StoreError> {
        let days = days.clamp(1, MAX_HEATMAP_DAYS);
        let start = today - Duration::days(i64::from(days) - 1);
        let recent_start = Self::recent_start(today);

        let mut by_date: BTreeMap<NaiveDate, u32> = BTreeMap::new();

        if start < recent_start {
            let oldest = today - Duration::days(i64::from(MAX_HEATMAP_DAYS) - 1);
            let historical_end = recent_start - Duration::days(1);
            let historical: Vec<ActivitySummary> = self
                .cache
                .get_cached(
                    &keys::activity(Tier::Historical, user_id),
                    Tier::Historical.ttl_secs(),
                    || self.store.summaries_between(user_id, oldest, historical_end),
                )
                .await?;
            by_date.extend(historical.iter().map(|s| (s.date, s.count)));
        }

        let overlap_start = recent_start - Duration::days(TIER_OVERLAP_DAYS);
        let recent: Vec<ActivitySummary> = self
            .cache
            .get_cached(
                &keys::activity(Tier::Recent, user_id),
                Tier::Recent.ttl_secs(),
                || self.store.summaries_between(user_id, overlap_start, today),
            )
            .await?;
        // Recent wins where the tiers overlap
        by_date.extend(recent.iter().map(|s| (s.date, s.count)));

        Ok(start
            .iter_days()
            .take_while(|d| *d <= today)
            .map(|date| HeatmapDay {
                date,
                count: by_date.get(&date).copied().unwrap_or(0),
            })
            .collect())
    }

    pub async fn stats(&self, user_id: &str, today: NaiveDate) -> Result<ActivityStats, StoreError> {
        self.cache
            .get_cached(&keys::stats(user_id), keys::STATS_TTL_SECS, || async {
                let summaries = self.store.all_summaries(user_id).await?;
                Ok::<_, StoreError>(ActivityStats::from_summaries(&summaries, today))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::MemoryStore;
    use crate::store::test_support::temp_store;

    fn aggregator() -> (tempfile::TempDir, Arc<MemoryStore>, ActivityAggregator) {
        let (dir, store) = temp_store();
        let memory = Arc::new(MemoryStore::new());
        let aggregator = ActivityAggregator::new(store, CacheClient::with_store(memory.clone()));
        (dir, memory, aggregator)
    }

    #[tokio::test]
    async fn test_heatmap_is_dense_and_ordered() {
        let (_dir, _memory, agg) = aggregator();
        let today = Utc::now().date_naive();
        agg.log_event("u1", None, "note", "a").await.unwrap();
        agg.log_event("u1", None, "note", "b").await.unwrap();
        agg.log_event("u1", Some(today - Duration::days(3)), "note", "c")
            .await
            .unwrap();

        let cells = agg.heatmap("u1", 7, today).await.unwrap();
        assert_eq!(cells.len(), 7);
        assert_eq!(cells[0].date, today - Duration::days(6));
        assert_eq!(cells[6].date, today);
        assert_eq!(cells[6].count, 2);
        assert_eq!(cells[3].count, 1);
        assert_eq!(cells.iter().map(|c| c.count).sum::<u32>(), 3);
    }

    #[tokio::test]
    async fn test_heatmap_tiers_are_cached_separately() {
        let (_dir, memory, agg) = aggregator();
        let today = Utc::now().date_naive();
        agg.log_event("u1", Some(today - Duration::days(100)), "note", "old")
            .await
            .unwrap();

        // Short window only touches the recent tier
        agg.heatmap("u1", 7, today).await.unwrap();
        assert!(memory.contains("activity:recent:u1"));
        assert!(!memory.contains("activity:historical:u1"));

        let cells = agg.heatmap("u1", 365, today).await.unwrap();
        assert!(memory.contains("activity:historical:u1"));
        assert_eq!(cells.iter().map(|c| c.count).sum::<u32>(), 1);

        // A new event today drops only the recent tier
        agg.log_event("u1", None, "note", "new").await.unwrap();
        assert!(!memory.contains("activity:recent:u1"));
        assert!(memory.contains("activity:historical:u1"));

        let cells = agg.heatmap("u1", 365, today).await.unwrap();
        assert_eq!(cells.iter().map(|c| c.count).sum::<u32>(), 2);
    }

    #[tokio::test]
    async fn test_backdated_event_refreshes_historical_tier() {
        let (_dir, memory, agg) = aggregator();
        let today = Utc::now().date_naive();
        agg.heatmap("u1", 365, today).await.unwrap();
        assert!(memory.contains("activity:historical:u1"));

        agg.log_event("u1", Some(today - Duration::days(200)), "note", "late")
            .await
            .unwrap();
        assert!(!memory.contains("activity:historical:u1"));

        let cells = agg.heatmap("u1", 365, today).await.unwrap();
        assert_eq!(cells.iter().map(|c| c.count).sum::<u32>(), 1);
    }

    #[tokio::test]
    async fn test_stats_cached_and_invalidated() {
        let (_dir, memory, agg) = aggregator();
        let today = Utc::now().date_naive();
        agg.log_event("u1", None, "note", "a").await.unwrap();

        let stats = agg.stats("u1", today).await.unwrap();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.current_streak, 1);
        assert!(memory.contains("activity-stats:u1"));

        agg.log_event("u1", None, "review", "b").await.unwrap();
        assert!(!memory.contains("activity-stats:u1"));
        let stats = agg.stats("u1", today).await.unwrap();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.by_type["review"], 1);
    }

    #[tokio::test]
    async fn test_heatmap_days_are_clamped() {
        let (_dir, _memory, agg) = aggregator();
        let today = Utc::now().date_naive();
        assert_eq!(agg.heatmap("u1", 0, today).await.unwrap().len(), 1);
        assert_eq!(
            agg.heatmap("u1", 10_000, today).await.unwrap().len(),
            MAX_HEATMAP_DAYS as usize
        );
    }
}
