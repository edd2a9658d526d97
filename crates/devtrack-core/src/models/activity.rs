//! Activity aggregation types.
//!
//! Activity is stored as one `ActivitySummary` per user per day rather than
//! one record per event, so heatmap and stats reads are O(days).

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LastActivity {
    #[serde(rename = "type")]
    pub activity_type: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// Per-day aggregate. `count` always equals the sum of `types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ActivitySummary {
    pub date: NaiveDate,
    pub count: u32,
    #[serde(default)]
    pub types: BTreeMap<String, u32>,
    #[serde(rename = "lastActivity", default)]
    pub last_activity: Option<LastActivity>,
}

impl ActivitySummary {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            types: BTreeMap::new(),
            last_activity: None,
        }
    }

    /// Apply one event to the summary.
    pub fn record(&mut self, activity_type: &str, description: &str, at: DateTime<Utc>) {
        self.count += 1;
        *self.types.entry(activity_type.to_string()).or_insert(0) += 1;
        self.last_activity = Some(LastActivity {
            activity_type: activity_type.to_string(),
            description: description.to_string(),
            at,
        });
    }

    pub fn is_consistent(&self) -> bool {
        self.types.values().sum::<u32>() == self.count
    }
}

/// One heatmap cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub count: u32,
}

impl From<&ActivitySummary> for HeatmapDay {
    fn from(summary: &ActivitySummary) -> Self {
        Self {
            date: summary.date,
            count: summary.count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ActivityStats {
    #[serde(rename = "totalEvents")]
    pub total_events: u64,
    #[serde(rename = "activeDays")]
    pub active_days: u32,
    #[serde(rename = "currentStreak")]
    pub current_streak: u32,
    #[serde(rename = "longestStreak")]
    pub longest_streak: u32,
    #[serde(rename = "byType")]
    pub by_type: BTreeMap<String, u64>,
}

impl ActivityStats {
    /// Compute stats from per-day summaries (any order).
    ///
    /// The current streak counts back from `today`, or from yesterday when
    /// nothing has been logged yet today.
    pub fn from_summaries(summaries: &[ActivitySummary], today: NaiveDate) -> Self {
        let mut days: Vec<NaiveDate> = summaries
            .iter()
            .filter(|s| s.count > 0)
            .map(|s| s.date)
            .collect();
        days.sort_unstable();
        days.dedup();

        let mut stats = ActivityStats {
            active_days: days.len() as u32,
            ..Default::default()
        };

        for summary in summaries {
            stats.total_events += u64::from(summary.count);
            for (kind, n) in &summary.types {
                *stats.by_type.entry(kind.clone()).or_insert(0) += u64::from(*n);
            }
        }

        let mut run = 0u32;
        let mut prev: Option<NaiveDate> = None;
        for day in &days {
            run = match prev {
                Some(p) if *day - p == Duration::days(1) => run + 1,
                _ => 1,
            };
            stats.longest_streak = stats.longest_streak.max(run);
            prev = Some(*day);
        }

        let anchor = if days.binary_search(&today).is_ok() {
            Some(today)
        } else {
            let yesterday = today - Duration::days(1);
            days.binary_search(&yesterday).is_ok().then_some(yesterday)
        };
        if let Some(mut day) = anchor {
            while days.binary_search(&day).is_ok() {
                stats.current_streak += 1;
                day -= Duration::days(1);
            }
        }

        stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogActivityRequest {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the server's current UTC date
    #[serde(default)]
    pub date: Option<NaiveDate>,
}
