//! Cache key builders and TTLs.
//!
//! Every key ends with the owning user id, so one user's writes never
//! invalidate another user's entries.

use devtrack_core::models::ResourceKind;

use super::pattern;

/// Whole-collection reads (`skills:{user}`)
pub const COLLECTION_TTL_SECS: u64 = 300;

/// Activity older than the recent window changes rarely
pub const HISTORICAL_TTL_SECS: u64 = 86_400;

pub const RECENT_TTL_SECS: u64 = 300;

pub const STATS_TTL_SECS: u64 = 300;

pub const DASHBOARD_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Historical,
    Recent,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Historical => "historical",
            Tier::Recent => "recent",
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        match self {
            Tier::Historical => HISTORICAL_TTL_SECS,
            Tier::Recent => RECENT_TTL_SECS,
        }
    }
}

pub fn collection(kind: ResourceKind, user_id: &str) -> String {
    format!("{}:{}", kind, user_id)
}

/// `{prefix}:{tier}:{user}`
pub fn tiered(prefix: &str, tier: Tier, user_id: &str) -> String {
    format!("{}:{}:{}", prefix, tier.as_str(), user_id)
}

pub fn activity(tier: Tier, user_id: &str) -> String {
    tiered("activity", tier, user_id)
}

pub fn stats(user_id: &str) -> String {
    format!("activity-stats:{}", user_id)
}

pub fn dashboard(user_id: &str) -> String {
    format!("dashboard:{}", user_id)
}

/// Every tiered key of a collection for one user
pub fn collection_tiers_pattern(kind: ResourceKind, user_id: &str) -> String {
    format!("{}:*:{}", kind, pattern::escape(user_id))
}

/// Every key owned by a user
pub fn user_pattern(user_id: &str) -> String {
    format!("*:{}", pattern::escape(user_id))
}
