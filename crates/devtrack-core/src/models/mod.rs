//! Data models for devtrack entities.
//!
//! This module contains the data structures shared by the client core and
//! the server:
//!
//! - `Skill`, `Project`, `Resource`: the tracked collections
//! - `ResourceKind`: which collection a record or request belongs to
//! - Activity types: `ActivitySummary`, `HeatmapDay`, `ActivityStats`
//! - Wire types: `BatchRequest`, `BatchResult`, `ApiEnvelope`, `CacheHealth`

pub mod activity;
pub mod batch;
pub mod dashboard;
pub mod kind;
pub mod project;
pub mod resource;
pub mod skill;

pub use activity::{ActivityStats, ActivitySummary, HeatmapDay, LastActivity, LogActivityRequest};
pub use batch::{ApiEnvelope, BatchError, BatchRequest, BatchResult, BatchUpdate};
pub use dashboard::{CacheHealth, CacheStatus, Dashboard};
pub use kind::ResourceKind;
pub use project::{Project, ProjectStatus};
pub use resource::Resource;
pub use skill::{Skill, SkillStatus};
