use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ActivitySummary;

/// Dashboard overview for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Dashboard {
    #[serde(rename = "skillsByStatus")]
    pub skills_by_status: BTreeMap<String, usize>,
    #[serde(rename = "projectsByStatus")]
    pub projects_by_status: BTreeMap<String, usize>,
    #[serde(rename = "resourceCount")]
    pub resource_count: usize,
    #[serde(rename = "completedResources")]
    pub completed_resources: usize,
    #[serde(rename = "recentActivity")]
    pub recent_activity: Vec<ActivitySummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum CacheStatus {
    Connected,
    NotConfigured,
    Error,
}

/// Body of `GET /cache-health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct CacheHealth {
    pub status: CacheStatus,
    /// `"passed"` when the write/read/delete probe succeeded
    pub test: Option<String>,
    #[serde(rename = "type")]
    pub backend: Option<String>,
}

impl CacheHealth {
    pub fn not_configured() -> Self {
        Self {
            status: CacheStatus::NotConfigured,
            test: None,
            backend: None,
        }
    }
}
