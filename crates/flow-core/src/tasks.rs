use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved project that owns every task without an explicit project.
pub const INBOX_PROJECT_ID: &str = "inbox";

/// Raised when a textual enum value is not one of the known variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Task status lifecycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Done,
        TaskStatus::Blocked,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Board ordering: todo, in-progress, blocked, done, cancelled.
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Todo => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Blocked => 2,
            TaskStatus::Done => 3,
            TaskStatus::Cancelled => 4,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("status", s))
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Lower rank is more pressing; urgent sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("priority", s))
    }
}

/// Checklist item owned by a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Subtask {
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed: false,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed = completed;
        self.completed_at = completed.then_some(now);
    }
}

/// Partial update for a subtask.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

/// Append-only discussion entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderChannel {
    #[default]
    Notification,
    Email,
    Sms,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub channel: ReminderChannel,
    #[serde(default)]
    pub sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Minutes.
    pub duration: u32,
    #[serde(default)]
    pub description: Option<String>,
}

/// Links into the rest of the Whisperr product family.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedItems {
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub meetings: Vec<String>,
    #[serde(default)]
    pub calendar_events: Vec<String>,
}

impl LinkedItems {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
            && self.events.is_empty()
            && self.meetings.is_empty()
            && self.calendar_events.is_empty()
    }
}

/// Task entity as held in the working set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    /// `None` means the task has no project at all; records read from a
    /// backend always resolve to a project, falling back to the inbox.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub time_entries: Vec<TimeEntry>,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    pub creator_id: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Minutes.
    #[serde(default)]
    pub estimated_time: Option<u32>,
    /// Minutes.
    #[serde(default)]
    pub actual_time: Option<u32>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "LinkedItems::is_empty")]
    pub linked: LinkedItems,
}

impl Task {
    /// Bare task with defaults for every optional attribute.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        creator_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            project_id: Some(INBOX_PROJECT_ID.to_string()),
            parent_task_id: None,
            labels: Vec::new(),
            subtasks: Vec::new(),
            comments: Vec::new(),
            attachments: Vec::new(),
            reminders: Vec::new(),
            time_entries: Vec::new(),
            assignee_ids: Vec::new(),
            creator_id: creator_id.into(),
            due_date: None,
            start_date: None,
            estimated_time: None,
            actual_time: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            position: 0,
            is_archived: false,
            linked: LinkedItems::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Project that owns this task, resolving a missing id to the inbox.
    pub fn project(&self) -> &str {
        self.project_id.as_deref().unwrap_or(INBOX_PROJECT_ID)
    }

    /// Change status, stamping or clearing the completion time on the
    /// transition into or out of `done`.
    pub fn set_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        if status == TaskStatus::Done && self.status != TaskStatus::Done {
            self.completed_at = Some(now);
        } else if status != TaskStatus::Done {
            self.completed_at = None;
        }
        self.status = status;
        self.updated_at = now;
    }

    /// Flip between `done` and `todo`.
    pub fn toggle_complete(&mut self, now: DateTime<Utc>) {
        let next = if self.is_done() {
            TaskStatus::Todo
        } else {
            TaskStatus::Done
        };
        self.set_status(next, now);
    }

    pub fn subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == subtask_id)
    }
}

/// Caller-supplied fields for a task that does not exist yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_time: Option<u32>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Field-level partial update. Outer `None` leaves a field untouched;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project_id: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
    pub assignee_ids: Option<Vec<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub estimated_time: Option<Option<u32>>,
    pub actual_time: Option<Option<u32>>,
    pub position: Option<i64>,
    pub is_archived: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(project_id) = &self.project_id {
            task.project_id = project_id.clone();
        }
        if let Some(labels) = &self.labels {
            task.labels = labels.clone();
        }
        if let Some(assignees) = &self.assignee_ids {
            task.assignee_ids = assignees.clone();
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(start) = self.start_date {
            task.start_date = start;
        }
        if let Some(estimate) = self.estimated_time {
            task.estimated_time = estimate;
        }
        if let Some(actual) = self.actual_time {
            task.actual_time = actual;
        }
        if let Some(position) = self.position {
            task.position = position;
        }
        if let Some(archived) = self.is_archived {
            task.is_archived = archived;
        }
        if let Some(status) = self.status {
            task.set_status(status, now);
        }
        task.updated_at = now;
    }
}
