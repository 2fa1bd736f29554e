//! Declarative view description: which tasks are visible and in what order.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::{ParseEnumError, Priority, TaskStatus};

/// Project constraint. `Unassigned` is distinct from `Any`: it only admits
/// tasks whose project id is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "id")]
pub enum ProjectFilter {
    #[default]
    Any,
    Is(String),
    Unassigned,
}

/// How the label set is matched against a task's labels.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabelMatch {
    /// At least one selected label is present.
    #[default]
    Any,
    /// Every selected label is present.
    All,
}

/// Half-open `[from, to)` window on the due date. Tasks without a due
/// date never fall inside a window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DueRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl DueRange {
    pub fn contains(&self, due: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| due >= from) && self.to.is_none_or(|to| due < to)
    }
}

/// All fields optional; empty sets mean "no constraint".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFilter {
    pub status: Vec<TaskStatus>,
    pub priority: Vec<Priority>,
    pub project: ProjectFilter,
    pub labels: Vec<String>,
    pub label_match: LabelMatch,
    pub assignee_ids: Vec<String>,
    pub due: Option<DueRange>,
    pub search: Option<String>,
    pub show_completed: bool,
    pub show_archived: bool,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status: Vec::new(),
            priority: Vec::new(),
            project: ProjectFilter::Any,
            labels: Vec::new(),
            label_match: LabelMatch::Any,
            assignee_ids: Vec::new(),
            due: None,
            search: None,
            show_completed: true,
            show_archived: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SortField {
    #[default]
    DueDate,
    Priority,
    CreatedAt,
    UpdatedAt,
    Title,
    Status,
    Position,
}

impl SortField {
    pub const ALL: [SortField; 7] = [
        SortField::DueDate,
        SortField::Priority,
        SortField::CreatedAt,
        SortField::UpdatedAt,
        SortField::Title,
        SortField::Status,
        SortField::Position,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::DueDate => "due-date",
            SortField::Priority => "priority",
            SortField::CreatedAt => "created-at",
            SortField::UpdatedAt => "updated-at",
            SortField::Title => "title",
            SortField::Status => "status",
            SortField::Position => "position",
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortField {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "-");
        SortField::ALL
            .into_iter()
            .find(|field| {
                field.as_str().eq_ignore_ascii_case(&wanted)
                    || field.as_str().replace('-', "").eq_ignore_ascii_case(&wanted)
            })
            .ok_or_else(|| ParseEnumError::new("sort field", s))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(ParseEnumError::new("sort direction", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl TaskSort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn asc(field: SortField) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: SortField) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}
