use serde::{Deserialize, Serialize};

use super::{Project, ProjectStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SkillStatus {
    #[default]
    WantToLearn,
    Learning,
    Mastered,
}

impl std::fmt::Display for SkillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillStatus::WantToLearn => write!(f, "Want to Learn"),
            SkillStatus::Learning => write!(f, "Learning"),
            SkillStatus::Mastered => write!(f, "Mastered"),
        }
    }
}

impl SkillStatus {
    /// Wire value, as stored in documents and cache entries
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillStatus::WantToLearn => "want_to_learn",
            SkillStatus::Learning => "learning",
            SkillStatus::Mastered => "mastered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Skill {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: SkillStatus,
    #[serde(rename = "linkedProjects", default)]
    pub linked_projects: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Skill {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            status: SkillStatus::default(),
            linked_projects: Vec::new(),
            notes: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// A skill can only be marked mastered once a project it is linked to
    /// (from either side) has been completed.
    pub fn can_master(&self, projects: &[Project]) -> bool {
        projects.iter().any(|p| {
            p.status == ProjectStatus::Completed
                && (self.linked_projects.contains(&p.id) || p.skills.contains(&self.id))
        })
    }
}
