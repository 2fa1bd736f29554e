//! Persistence collaborator contract and the record shapes it exchanges.
//!
//! Records are the boundary representation: enums and dates travel as
//! strings and a task's project rides along as a `project:<id>` tag. They are
//! mapped to and from the typed domain exactly once, in `flow-backend`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    events::{Event, EventGuest, NewEvent, NewEventGuest},
    focus::{FocusSession, NewFocusSession},
    labels::{Label, NewLabel},
    projects::ProjectSettings,
    tasks::{Attachment, Comment, LinkedItems, Reminder, Subtask, TimeEntry},
};

/// Task document as stored by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(rename = "$id", default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub completed_at: String,
    #[serde(default)]
    pub user_id: String,
    /// Labels plus at most one `project:<id>` tag.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub estimated_time: Option<u32>,
    #[serde(default)]
    pub actual_time: Option<u32>,
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
    pub linked: LinkedItems,
    #[serde(rename = "$createdAt", default)]
    pub created_at: String,
    #[serde(rename = "$updatedAt", default)]
    pub updated_at: String,
}

/// Project document ("calendar" on the backend side).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(rename = "$id", default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    /// The backend's "default calendar" flag, surfaced as favorite.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub default_view: String,
    #[serde(default)]
    pub settings: Option<ProjectSettings>,
    #[serde(rename = "$createdAt", default)]
    pub created_at: String,
    #[serde(rename = "$updatedAt", default)]
    pub updated_at: String,
}

/// Asynchronous CRUD over records keyed by opaque string ids.
///
/// `create_*` ignores the id and system timestamps of its input and returns
/// the persisted record with both assigned.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>>;
    async fn create_task(&self, record: TaskRecord) -> Result<TaskRecord>;
    async fn update_task(&self, record: TaskRecord) -> Result<TaskRecord>;
    async fn delete_task(&self, id: &str) -> Result<()>;

    async fn list_projects(&self) -> Result<Vec<ProjectRecord>>;
    async fn create_project(&self, record: ProjectRecord) -> Result<ProjectRecord>;
    async fn update_project(&self, record: ProjectRecord) -> Result<ProjectRecord>;
    async fn delete_project(&self, id: &str) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<Label>>;
    async fn create_label(&self, label: NewLabel) -> Result<Label>;
    async fn update_label(&self, label: Label) -> Result<Label>;
    async fn delete_label(&self, id: &str) -> Result<()>;

    async fn list_focus_sessions(&self) -> Result<Vec<FocusSession>>;
    async fn create_focus_session(
        &self,
        user_id: &str,
        session: NewFocusSession,
    ) -> Result<FocusSession>;

    async fn list_events(&self) -> Result<Vec<Event>>;
    async fn create_event(&self, organizer_id: &str, event: NewEvent) -> Result<Event>;
    async fn update_event(&self, event: Event) -> Result<Event>;
    /// Removes the event together with its guests.
    async fn delete_event(&self, id: &str) -> Result<()>;

    async fn list_event_guests(&self, event_id: &str) -> Result<Vec<EventGuest>>;
    async fn create_event_guest(&self, guest: NewEventGuest) -> Result<EventGuest>;
    async fn delete_event_guest(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_record_reads_document_shape() {
        let json = r#"{
            "$id": "abc",
            "title": "Fix Login Bug",
            "status": "in-progress",
            "dueDate": "2025-06-01T00:00:00Z",
            "tags": ["bug", "project:p1"],
            "userId": "u1",
            "$createdAt": "2025-05-01T10:00:00Z",
            "$updatedAt": "2025-05-02T10:00:00Z"
        }"#;
        let record: TaskRecord = serde_json::from_str(json).expect("parse");
        assert_eq!(record.id, "abc");
        assert_eq!(record.status, "in-progress");
        assert_eq!(record.priority, "");
        assert_eq!(record.tags.len(), 2);
        assert_eq!(record.created_at, "2025-05-01T10:00:00Z");
        assert!(record.subtasks.is_empty());
    }
}
