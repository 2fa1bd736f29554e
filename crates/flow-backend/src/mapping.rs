//! One mapping function per entity and direction between backend records
//! and the typed domain. Malformed fields never fail the mapping: unknown
//! enums fall back to their defaults and unreadable dates become absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use flow_core::{
    backend::{ProjectRecord, TaskRecord},
    identity::GUEST_USER_ID,
    projects::{Project, ViewMode},
    tasks::{Priority, Task, TaskStatus, INBOX_PROJECT_ID},
};
use tracing::debug;

/// Tag prefix that carries a task's project on the backend.
pub const PROJECT_TAG_PREFIX: &str = "project:";

const DEFAULT_PROJECT_COLOR: &str = "#3b82f6";

pub fn task_from_record(record: TaskRecord) -> Task {
    let (project_id, labels) = split_tags(record.tags);
    let status = record.status.parse::<TaskStatus>().unwrap_or_else(|_| {
        if !record.status.is_empty() {
            debug!(id = %record.id, status = %record.status, "unknown status, using todo");
        }
        TaskStatus::Todo
    });
    let priority = record.priority.parse::<Priority>().unwrap_or_else(|_| {
        if !record.priority.is_empty() {
            debug!(id = %record.id, priority = %record.priority, "unknown priority, using medium");
        }
        Priority::Medium
    });

    let created_at = parse_timestamp(&record.created_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let updated_at = parse_timestamp(&record.updated_at).unwrap_or(created_at);
    let completed_at = match status {
        TaskStatus::Done => Some(parse_timestamp(&record.completed_at).unwrap_or(updated_at)),
        _ => None,
    };

    Task {
        id: record.id,
        title: record.title,
        description: non_empty(record.description),
        status,
        priority,
        project_id: Some(project_id),
        parent_task_id: non_empty(record.parent_id),
        labels,
        subtasks: record.subtasks,
        comments: record.comments,
        attachments: record.attachments,
        reminders: record.reminders,
        time_entries: record.time_entries,
        assignee_ids: record.assignee_ids,
        creator_id: non_empty(record.user_id).unwrap_or_else(|| GUEST_USER_ID.to_string()),
        due_date: parse_timestamp(&record.due_date),
        start_date: parse_timestamp(&record.start_date),
        estimated_time: record.estimated_time,
        actual_time: record.actual_time,
        completed_at,
        created_at,
        updated_at,
        position: record.position,
        is_archived: record.is_archived,
        linked: record.linked,
    }
}

pub fn record_from_task(task: &Task) -> TaskRecord {
    let mut tags = task.labels.clone();
    match task.project_id.as_deref() {
        Some(project) if project != INBOX_PROJECT_ID && !project.is_empty() => {
            tags.push(format!("{PROJECT_TAG_PREFIX}{project}"));
        }
        _ => {}
    }

    TaskRecord {
        id: task.id.clone(),
        title: task.title.clone(),
        description: task.description.clone().unwrap_or_default(),
        status: task.status.as_str().to_string(),
        priority: task.priority.as_str().to_string(),
        due_date: format_optional(task.due_date),
        start_date: format_optional(task.start_date),
        completed_at: format_optional(task.completed_at),
        user_id: task.creator_id.clone(),
        tags,
        assignee_ids: task.assignee_ids.clone(),
        parent_id: task.parent_task_id.clone().unwrap_or_default(),
        position: task.position,
        is_archived: task.is_archived,
        estimated_time: task.estimated_time,
        actual_time: task.actual_time,
        subtasks: task.subtasks.clone(),
        comments: task.comments.clone(),
        attachments: task.attachments.clone(),
        reminders: task.reminders.clone(),
        time_entries: task.time_entries.clone(),
        linked: task.linked.clone(),
        created_at: format_timestamp(task.created_at),
        updated_at: format_timestamp(task.updated_at),
    }
}

pub fn project_from_record(record: ProjectRecord) -> Project {
    let created_at = parse_timestamp(&record.created_at).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let updated_at = parse_timestamp(&record.updated_at).unwrap_or(created_at);
    Project {
        id: record.id,
        name: record.name,
        description: non_empty(record.description),
        color: non_empty(record.color).unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
        icon: non_empty(record.icon),
        owner_id: non_empty(record.user_id).unwrap_or_else(|| GUEST_USER_ID.to_string()),
        member_ids: record.member_ids,
        is_archived: record.is_archived,
        is_favorite: record.is_default,
        default_view: record.default_view.parse::<ViewMode>().unwrap_or_default(),
        created_at,
        updated_at,
        position: record.position,
        settings: record.settings.unwrap_or_default(),
    }
}

pub fn record_from_project(project: &Project) -> ProjectRecord {
    ProjectRecord {
        id: project.id.clone(),
        name: project.name.clone(),
        color: project.color.clone(),
        description: project.description.clone().unwrap_or_default(),
        icon: project.icon.clone().unwrap_or_default(),
        user_id: project.owner_id.clone(),
        member_ids: project.member_ids.clone(),
        is_default: project.is_favorite,
        is_archived: project.is_archived,
        position: project.position,
        default_view: project.default_view.as_str().to_string(),
        settings: Some(project.settings.clone()),
        created_at: format_timestamp(project.created_at),
        updated_at: format_timestamp(project.updated_at),
    }
}

/// Accepts RFC 3339, a bare `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a plain
/// date (midnight UTC). Anything else, including the empty string, is absent.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    debug!(raw, "unreadable timestamp treated as absent");
    None
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_optional(at: Option<DateTime<Utc>>) -> String {
    at.map(format_timestamp).unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Separate the project tag from ordinary labels. The first project tag
/// wins; a missing or empty one resolves to the inbox.
fn split_tags(tags: Vec<String>) -> (String, Vec<String>) {
    let mut project = None;
    let mut labels = Vec::with_capacity(tags.len());
    for tag in tags {
        match tag.strip_prefix(PROJECT_TAG_PREFIX) {
            Some(id) => {
                if project.is_none() && !id.is_empty() {
                    project = Some(id.to_string());
                }
            }
            None => labels.push(tag),
        }
    }
    (
        project.unwrap_or_else(|| INBOX_PROJECT_ID.to_string()),
        labels,
    )
}
