//! Per-user dashboard overview.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use devtrack_core::models::{Dashboard, ResourceKind};
use serde_json::Value;

use crate::cache::{keys, CacheClient};
use crate::store::{Store, StoreError};

/// Days of activity shown on the dashboard.
pub const DASHBOARD_ACTIVITY_DAYS: i64 = 7;

fn count_by_status(docs: &[Value], default_status: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for doc in docs {
        let status = doc
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(default_status);
        *counts.entry(status.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Build the dashboard straight from storage.
pub async fn build(store: &Store, user_id: &str, today: NaiveDate) -> Result<Dashboard, StoreError> {
    let (skills, projects, resources, recent) = tokio::try_join!(
        store.list(ResourceKind::Skills, user_id),
        store.list(ResourceKind::Projects, user_id),
        store.list(ResourceKind::Resources, user_id),
        store.summaries_between(
            user_id,
            today - Duration::days(DASHBOARD_ACTIVITY_DAYS - 1),
            today
        ),
    )?;

    Ok(Dashboard {
        skills_by_status: count_by_status(&skills, "want_to_learn"),
        projects_by_status: count_by_status(&projects, "planned"),
        resource_count: resources.len(),
        completed_resources: resources
            .iter()
            .filter(|r| r.get("completed").and_then(Value::as_bool) == Some(true))
            .count(),
        recent_activity: recent,
    })
}

/// Cached dashboard read.
pub async fn load(
    cache: &CacheClient,
    store: &Store,
    user_id: &str,
    today: NaiveDate,
) -> Result<Dashboard, StoreError> {
    cache
        .get_cached(&keys::dashboard(user_id), keys::DASHBOARD_TTL_SECS, || {
            build(store, user_id, today)
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::store::activity::ActivityEvent;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_dashboard_counts() {
        let (_dir, store) = temp_store();
        for (name, status) in [("Rust", "learning"), ("Go", "learning"), ("Zig", "mastered")] {
            store
                .create(ResourceKind::Skills, "u1", json!({"name": name, "status": status}))
                .await
                .unwrap();
        }
        store
            .create(ResourceKind::Skills, "u1", json!({"name": "Elm"}))
            .await
            .unwrap();
        store
            .create(ResourceKind::Resources, "u1", json!({"title": "Book", "completed": true}))
            .await
            .unwrap();
        store
            .create(ResourceKind::Resources, "u1", json!({"title": "Course"}))
            .await
            .unwrap();

        let today = Utc::now().date_naive();
        store
            .record_activity(ActivityEvent {
                user_id: "u1".to_string(),
                date: today,
                activity_type: "note".to_string(),
                description: String::new(),
                at: Utc::now(),
            })
            .await
            .unwrap();

        let dashboard = build(&store, "u1", today).await.unwrap();
        assert_eq!(dashboard.skills_by_status["learning"], 2);
        assert_eq!(dashboard.skills_by_status["mastered"], 1);
        assert_eq!(dashboard.skills_by_status["want_to_learn"], 1);
        assert!(dashboard.projects_by_status.is_empty());
        assert_eq!(dashboard.resource_count, 2);
        assert_eq!(dashboard.completed_resources, 1);
        assert_eq!(dashboard.recent_activity.len(), 1);
    }
}
