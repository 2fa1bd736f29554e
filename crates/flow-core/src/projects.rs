use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::{ParseEnumError, Priority, INBOX_PROJECT_ID};

/// How a project's tasks are laid out by default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    List,
    Board,
    Calendar,
    Timeline,
    Matrix,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::List => "list",
            ViewMode::Board => "board",
            ViewMode::Calendar => "calendar",
            ViewMode::Timeline => "timeline",
            ViewMode::Matrix => "matrix",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ViewMode::List,
            ViewMode::Board,
            ViewMode::Calendar,
            ViewMode::Timeline,
            ViewMode::Matrix,
        ]
        .into_iter()
        .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| ParseEnumError::new("view mode", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub default_priority: Priority,
    pub allow_subtasks: bool,
    pub allow_time_tracking: bool,
    pub allow_recurrence: bool,
    pub show_completed_tasks: bool,
    #[serde(default)]
    pub auto_archive_completed_after_days: Option<u32>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            default_priority: Priority::Medium,
            allow_subtasks: true,
            allow_time_tracking: true,
            allow_recurrence: true,
            show_completed_tasks: true,
            auto_archive_completed_after_days: None,
        }
    }
}

/// Container grouping tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
    #[serde(default)]
    pub icon: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub default_view: ViewMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub settings: ProjectSettings,
}

impl Project {
    /// The reserved inbox; never persisted, always present.
    pub fn inbox(owner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: INBOX_PROJECT_ID.to_string(),
            name: "Inbox".to_string(),
            description: None,
            color: "#64748b".to_string(),
            icon: Some("inbox".to_string()),
            owner_id: owner_id.into(),
            member_ids: Vec::new(),
            is_archived: false,
            is_favorite: false,
            default_view: ViewMode::List,
            created_at: now,
            updated_at: now,
            position: -1,
            settings: ProjectSettings::default(),
        }
    }

    pub fn is_inbox(&self) -> bool {
        self.id == INBOX_PROJECT_ID
    }
}

/// Caller-supplied fields for a new project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub color: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_favorite: bool,
    pub default_view: ViewMode,
    pub settings: ProjectSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<Option<String>>,
    pub icon: Option<Option<String>>,
    pub is_archived: Option<bool>,
    pub is_favorite: Option<bool>,
    pub default_view: Option<ViewMode>,
    pub position: Option<i64>,
    pub settings: Option<ProjectSettings>,
}

impl ProjectPatch {
    pub fn apply(&self, project: &mut Project, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            project.name = name.clone();
        }
        if let Some(color) = &self.color {
            project.color = color.clone();
        }
        if let Some(description) = &self.description {
            project.description = description.clone();
        }
        if let Some(icon) = &self.icon {
            project.icon = icon.clone();
        }
        if let Some(archived) = self.is_archived {
            project.is_archived = archived;
        }
        if let Some(favorite) = self.is_favorite {
            project.is_favorite = favorite;
        }
        if let Some(view) = self.default_view {
            project.default_view = view;
        }
        if let Some(position) = self.position {
            project.position = position;
        }
        if let Some(settings) = &self.settings {
            project.settings = settings.clone();
        }
        project.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn inbox_is_reserved() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let inbox = Project::inbox("guest", now);
        assert!(inbox.is_inbox());
        assert_eq!(inbox.settings.default_priority, Priority::Medium);
    }

    #[test]
    fn patch_renames_and_stamps() {
        let then = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let mut project = Project::inbox("guest", then);
        project.id = "p1".into();

        ProjectPatch {
            name: Some("Launch".into()),
            is_favorite: Some(true),
            ..ProjectPatch::default()
        }
        .apply(&mut project, now);

        assert_eq!(project.name, "Launch");
        assert!(project.is_favorite);
        assert_eq!(project.color, "#64748b");
        assert_eq!(project.updated_at, now);
    }

    #[test]
    fn view_mode_round_trips_through_text() {
        assert_eq!("Board".parse::<ViewMode>(), Ok(ViewMode::Board));
        assert!("grid".parse::<ViewMode>().is_err());
    }
}
