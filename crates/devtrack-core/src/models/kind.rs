use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The collections that share the batch sync and caching paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum ResourceKind {
    Skills,
    Projects,
    Resources,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Skills,
        ResourceKind::Projects,
        ResourceKind::Resources,
    ];

    /// Path segment and cache key prefix for this collection
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Skills => "skills",
            ResourceKind::Projects => "projects",
            ResourceKind::Resources => "resources",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skills" => Ok(ResourceKind::Skills),
            "projects" => Ok(ResourceKind::Projects),
            "resources" => Ok(ResourceKind::Resources),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}
