use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use flow_backend::mapping::{
    parse_timestamp, project_from_record, record_from_project, record_from_task, task_from_record,
};
use flow_core::{
    backend::{Backend, TaskRecord},
    events::{Event, EventGuest, EventStatus, GuestRole, GuestStatus, NewEvent, NewEventGuest},
    filter::{TaskFilter, TaskSort},
    focus::{FocusSession, NewFocusSession},
    identity::{IdentityProvider, GUEST_USER_ID},
    labels::{default_labels, Label, LabelPatch, NewLabel},
    projects::{NewProject, Project, ProjectPatch},
    tasks::{Comment, NewTask, Subtask, SubtaskPatch, Task, TaskPatch, TaskStatus, INBOX_PROJECT_ID},
};
use flow_query::{derive_dashboard, derive_stats, filter_and_sort, stats, Dashboard, Stats};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    error::StateError,
};

/// Owner of the working set.
///
/// Every mutation is applied to the working set first and then mirrored to
/// the backend. When the backend refuses, the local change is undone, any
/// records already written for the same change are written back,
/// `last_error` records what failed, and the error is returned.
pub struct TaskStore<B: Backend> {
    backend: B,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    user_id: String,
    tasks: Vec<Task>,
    projects: Vec<Project>,
    labels: Vec<Label>,
    selected_task: Option<String>,
    selected_project: Option<String>,
    filter: TaskFilter,
    sort: TaskSort,
    search: String,
    last_error: Option<String>,
}

impl<B: Backend> TaskStore<B> {
    pub fn new(backend: B, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_clock(backend, identity, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: B,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            backend,
            identity,
            clock,
            user_id: GUEST_USER_ID.to_string(),
            tasks: Vec::new(),
            projects: vec![Project::inbox(GUEST_USER_ID, now)],
            labels: default_labels(),
            selected_task: None,
            selected_project: None,
            filter: TaskFilter::default(),
            sort: TaskSort::default(),
            search: String::new(),
            last_error: None,
        }
    }

    /// Resolve the current user and replace the working set with the
    /// backend's contents.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn load(&mut self) -> Result<(), StateError> {
        self.user_id = resolve_user(self.identity.as_ref()).await;

        let fetched = async {
            let tasks = self.backend.list_tasks().await?;
            let projects = self.backend.list_projects().await?;
            let labels = self.backend.list_labels().await?;
            anyhow::Ok((tasks, projects, labels))
        }
        .await;

        match fetched {
            Ok((tasks, projects, labels)) => {
                self.tasks = tasks.into_iter().map(task_from_record).collect();
                self.projects = projects.into_iter().map(project_from_record).collect();
                self.labels = labels;
                self.ensure_inbox();
                self.last_error = None;
                info!(
                    user = %self.user_id,
                    tasks = self.tasks.len(),
                    projects = self.projects.len(),
                    "working set loaded"
                );
                Ok(())
            }
            Err(err) => Err(self.fail("Failed to load data", err)),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // View state and queries.

    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    pub fn sort(&self) -> &TaskSort {
        &self.sort
    }

    pub fn set_sort(&mut self, sort: TaskSort) {
        self.sort = sort;
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    /// Tasks for the current filter, sort and search.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        filter_and_sort(&self.tasks, &self.filter, &self.sort, Some(&self.search))
    }

    pub fn stats<Tz: TimeZone>(&self, reference: &DateTime<Tz>) -> Stats {
        derive_stats(&self.tasks, reference)
    }

    pub fn dashboard<Tz: TimeZone>(&self, reference: &DateTime<Tz>) -> Dashboard {
        derive_dashboard(&self.tasks, reference)
    }

    pub fn tasks_by_project(&self, project_id: &str) -> Vec<&Task> {
        stats::tasks_by_project(&self.tasks, project_id)
    }

    pub fn select_task(&mut self, id: Option<&str>) {
        self.selected_task = id.map(str::to_string);
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.selected_task.as_deref().and_then(|id| self.task(id))
    }

    pub fn select_project(&mut self, id: Option<&str>) {
        self.selected_project = id.map(str::to_string);
    }

    pub fn selected_project(&self) -> Option<&Project> {
        self.selected_project
            .as_deref()
            .and_then(|id| self.project(id))
    }

    // Tasks.

    /// Persist a new task and append it to the working set. The backend
    /// assigns the id, so the task only appears once that call succeeds.
    #[instrument(skip_all, fields(title = %new.title))]
    pub async fn add_task(&mut self, new: NewTask) -> Result<Task, StateError> {
        if new.title.trim().is_empty() {
            return Err(StateError::Empty("task title"));
        }
        if let Some(project) = new.project_id.as_deref() {
            if self.project(project).is_none() {
                return Err(StateError::ProjectNotFound(project.to_string()));
            }
        }

        let now = self.clock.now();
        let mut task = Task::new("", new.title, self.user_id.clone(), now);
        task.description = new.description;
        task.priority = new.priority;
        task.project_id = Some(new.project_id.unwrap_or_else(|| INBOX_PROJECT_ID.to_string()));
        task.parent_task_id = new.parent_task_id;
        task.labels = new.labels;
        task.assignee_ids = new.assignee_ids;
        task.due_date = new.due_date;
        task.start_date = new.start_date;
        task.estimated_time = new.estimated_time;
        task.position = self.next_task_position();
        task.set_status(new.status, now);

        match self.backend.create_task(record_from_task(&task)).await {
            Ok(record) => {
                let created = task_from_record(record);
                info!(id = %created.id, "task created");
                self.tasks.push(created.clone());
                Ok(created)
            }
            Err(err) => Err(self.fail("Failed to create task", err)),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&mut self, id: &str, patch: TaskPatch) -> Result<Task, StateError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StateError::Empty("task title"));
        }
        if let Some(Some(project)) = patch.project_id.as_ref() {
            if self.project(project).is_none() {
                return Err(StateError::ProjectNotFound(project.clone()));
            }
        }
        self.mutate_task(id, "Failed to update task", |task, now| {
            patch.apply(task, now);
            Ok(())
        })
        .await
    }

    /// Toggle between done and todo.
    #[instrument(skip(self))]
    pub async fn complete_task(&mut self, id: &str) -> Result<Task, StateError> {
        self.mutate_task(id, "Failed to complete task", |task, now| {
            task.toggle_complete(now);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_task_status(
        &mut self,
        id: &str,
        status: TaskStatus,
    ) -> Result<Task, StateError> {
        self.mutate_task(id, "Failed to update task", |task, now| {
            task.set_status(status, now);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn archive_task(&mut self, id: &str, archived: bool) -> Result<Task, StateError> {
        self.mutate_task(id, "Failed to archive task", |task, now| {
            task.is_archived = archived;
            task.updated_at = now;
            Ok(())
        })
        .await
    }

    /// Permanently remove a task from the working set.
    #[instrument(skip(self))]
    pub async fn delete_task(&mut self, id: &str) -> Result<(), StateError> {
        let index = self.task_index(id)?;
        let removed = self.tasks.remove(index);
        let was_selected = self.selected_task.as_deref() == Some(id);
        if was_selected {
            self.selected_task = None;
        }

        if let Err(err) = self.backend.delete_task(id).await {
            self.tasks.insert(index, removed);
            if was_selected {
                self.selected_task = Some(id.to_string());
            }
            return Err(self.fail("Failed to delete task", err));
        }
        info!(id, "task deleted");
        Ok(())
    }

    /// Assign positions `0..n` following `ids`; unknown ids are skipped.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn reorder_tasks(&mut self, ids: &[String]) -> Result<(), StateError> {
        let snapshot = self.tasks.clone();
        let mut changed = Vec::new();
        for (position, id) in ids.iter().enumerate() {
            let position = position as i64;
            if let Some(task) = self.tasks.iter_mut().find(|t| &t.id == id) {
                if task.position != position {
                    task.position = position;
                    changed.push(record_from_task(task));
                }
            }
        }

        let mut saved = Vec::new();
        if let Err(err) = self.persist_tasks(changed, &mut saved).await {
            self.tasks = snapshot;
            self.undo_task_writes(&saved).await;
            return Err(self.fail("Failed to reorder tasks", err));
        }
        self.adopt_task_stamps(&saved);
        Ok(())
    }

    // Subtasks and comments.

    #[instrument(skip(self))]
    pub async fn add_subtask(&mut self, task_id: &str, title: &str) -> Result<Subtask, StateError> {
        if title.trim().is_empty() {
            return Err(StateError::Empty("subtask title"));
        }
        let subtask_id = new_id();
        let task = self
            .mutate_task(task_id, "Failed to add subtask", |task, now| {
                task.subtasks.push(Subtask::new(subtask_id.clone(), title, now));
                task.updated_at = now;
                Ok(())
            })
            .await?;
        find_subtask(&task, &subtask_id)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_subtask(
        &mut self,
        task_id: &str,
        subtask_id: &str,
        patch: SubtaskPatch,
    ) -> Result<Subtask, StateError> {
        let task = self
            .mutate_task(task_id, "Failed to update subtask", |task, now| {
                let subtask = task
                    .subtask_mut(subtask_id)
                    .ok_or_else(|| missing_subtask(task_id, subtask_id))?;
                if let Some(title) = &patch.title {
                    subtask.title = title.clone();
                }
                if let Some(completed) = patch.completed {
                    if completed != subtask.completed {
                        subtask.set_completed(completed, now);
                    }
                }
                task.updated_at = now;
                Ok(())
            })
            .await?;
        find_subtask(&task, subtask_id)
    }

    #[instrument(skip(self))]
    pub async fn toggle_subtask(
        &mut self,
        task_id: &str,
        subtask_id: &str,
    ) -> Result<Subtask, StateError> {
        let task = self
            .mutate_task(task_id, "Failed to toggle subtask", |task, now| {
                let subtask = task
                    .subtask_mut(subtask_id)
                    .ok_or_else(|| missing_subtask(task_id, subtask_id))?;
                let completed = !subtask.completed;
                subtask.set_completed(completed, now);
                task.updated_at = now;
                Ok(())
            })
            .await?;
        find_subtask(&task, subtask_id)
    }

    #[instrument(skip(self))]
    pub async fn delete_subtask(&mut self, task_id: &str, subtask_id: &str) -> Result<(), StateError> {
        self.mutate_task(task_id, "Failed to delete subtask", |task, now| {
            let before = task.subtasks.len();
            task.subtasks.retain(|s| s.id != subtask_id);
            if task.subtasks.len() == before {
                return Err(missing_subtask(task_id, subtask_id));
            }
            task.updated_at = now;
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Append a comment authored by the current user.
    #[instrument(skip(self, content))]
    pub async fn add_comment(&mut self, task_id: &str, content: &str) -> Result<Comment, StateError> {
        if content.trim().is_empty() {
            return Err(StateError::Empty("comment"));
        }
        let comment_id = new_id();
        let author = self.user_id.clone();
        let task = self
            .mutate_task(task_id, "Failed to add comment", |task, now| {
                task.comments.push(Comment {
                    id: comment_id.clone(),
                    content: content.to_string(),
                    author_id: author.clone(),
                    author_name: author,
                    created_at: now,
                });
                task.updated_at = now;
                Ok(())
            })
            .await?;
        task.comments
            .into_iter()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| StateError::TaskNotFound(task_id.to_string()))
    }

    // Projects.

    #[instrument(skip_all, fields(name = %new.name))]
    pub async fn add_project(&mut self, new: NewProject) -> Result<Project, StateError> {
        if new.name.trim().is_empty() {
            return Err(StateError::Empty("project name"));
        }
        let now = self.clock.now();
        let position = self
            .projects
            .iter()
            .map(|p| p.position)
            .max()
            .map_or(0, |p| p + 1);
        let mut project = Project::inbox(self.user_id.clone(), now);
        project.id = String::new();
        project.name = new.name;
        project.color = new.color;
        project.description = new.description;
        project.icon = new.icon;
        project.is_favorite = new.is_favorite;
        project.default_view = new.default_view;
        project.settings = new.settings;
        project.position = position;

        match self.backend.create_project(record_from_project(&project)).await {
            Ok(record) => {
                let created = project_from_record(record);
                info!(id = %created.id, "project created");
                self.projects.push(created.clone());
                Ok(created)
            }
            Err(err) => Err(self.fail("Failed to create project", err)),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_project(
        &mut self,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<Project, StateError> {
        if id == INBOX_PROJECT_ID {
            return Err(StateError::InboxIsReserved);
        }
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(StateError::Empty("project name"));
        }
        let index = self.project_index(id)?;
        let previous = self.projects[index].clone();
        patch.apply(&mut self.projects[index], self.clock.now());

        let record = record_from_project(&self.projects[index]);
        match self.backend.update_project(record).await {
            Ok(saved) => {
                if let Some(at) = parse_timestamp(&saved.updated_at) {
                    self.projects[index].updated_at = at;
                }
                Ok(self.projects[index].clone())
            }
            Err(err) => {
                self.projects[index] = previous;
                Err(self.fail("Failed to update project", err))
            }
        }
    }

    /// Remove a project; its tasks move to the inbox.
    #[instrument(skip(self))]
    pub async fn delete_project(&mut self, id: &str) -> Result<(), StateError> {
        if id == INBOX_PROJECT_ID {
            return Err(StateError::InboxIsReserved);
        }
        let index = self.project_index(id)?;
        let now = self.clock.now();
        let tasks_before = self.tasks.clone();
        let removed = self.projects.remove(index);
        let was_selected = self.selected_project.as_deref() == Some(id);
        if was_selected {
            self.selected_project = None;
        }

        let mut moved = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.project_id.as_deref() == Some(id))
        {
            task.project_id = Some(INBOX_PROJECT_ID.to_string());
            task.updated_at = now;
            moved.push(record_from_task(task));
        }
        let moved_count = moved.len();

        // Tasks move before the project goes, so a failure never leaves
        // tasks pointing at a deleted project.
        let mut saved = Vec::new();
        let persisted = match self.persist_tasks(moved, &mut saved).await {
            Ok(()) => self.backend.delete_project(id).await,
            Err(err) => Err(err),
        };

        if let Err(err) = persisted {
            self.tasks = tasks_before;
            self.projects.insert(index, removed);
            if was_selected {
                self.selected_project = Some(id.to_string());
            }
            self.undo_task_writes(&saved).await;
            return Err(self.fail("Failed to delete project", err));
        }
        self.adopt_task_stamps(&saved);
        info!(id, moved = moved_count, "project deleted");
        Ok(())
    }

    // Labels.

    #[instrument(skip_all, fields(name = %new.name))]
    pub async fn add_label(&mut self, new: NewLabel) -> Result<Label, StateError> {
        if new.name.trim().is_empty() {
            return Err(StateError::Empty("label name"));
        }
        match self.backend.create_label(new).await {
            Ok(label) => {
                self.labels.push(label.clone());
                Ok(label)
            }
            Err(err) => Err(self.fail("Failed to create label", err)),
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_label(&mut self, id: &str, patch: LabelPatch) -> Result<Label, StateError> {
        let index = self
            .labels
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| StateError::LabelNotFound(id.to_string()))?;
        let previous = self.labels[index].clone();
        patch.apply(&mut self.labels[index]);

        match self.backend.update_label(self.labels[index].clone()).await {
            Ok(label) => Ok(label),
            Err(err) => {
                self.labels[index] = previous;
                Err(self.fail("Failed to update label", err))
            }
        }
    }

    /// Remove a label from the vocabulary and from every task carrying it.
    #[instrument(skip(self))]
    pub async fn delete_label(&mut self, id: &str) -> Result<(), StateError> {
        let index = self
            .labels
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| StateError::LabelNotFound(id.to_string()))?;
        let tasks_before = self.tasks.clone();
        let removed = self.labels.remove(index);

        let mut stripped = Vec::new();
        for task in self.tasks.iter_mut() {
            let before = task.labels.len();
            task.labels.retain(|l| l != id);
            if task.labels.len() != before {
                stripped.push(record_from_task(task));
            }
        }

        let mut saved = Vec::new();
        let persisted = match self.persist_tasks(stripped, &mut saved).await {
            Ok(()) => self.backend.delete_label(id).await,
            Err(err) => Err(err),
        };

        if let Err(err) = persisted {
            self.tasks = tasks_before;
            self.labels.insert(index, removed);
            self.undo_task_writes(&saved).await;
            return Err(self.fail("Failed to delete label", err));
        }
        self.adopt_task_stamps(&saved);
        Ok(())
    }

    // Focus sessions.

    #[instrument(skip_all, fields(status = %session.status))]
    pub async fn record_focus_session(
        &mut self,
        session: NewFocusSession,
    ) -> Result<FocusSession, StateError> {
        if let Some(task_id) = session.task_id.as_deref() {
            self.task_index(task_id)?;
        }
        match self
            .backend
            .create_focus_session(&self.user_id, session)
            .await
        {
            Ok(saved) => Ok(saved),
            Err(err) => Err(self.fail("Failed to save focus session", err)),
        }
    }

    pub async fn focus_sessions(&mut self) -> Result<Vec<FocusSession>, StateError> {
        match self.backend.list_focus_sessions().await {
            Ok(sessions) => Ok(sessions),
            Err(err) => Err(self.fail("Failed to load focus sessions", err)),
        }
    }

    // Events.

    /// Events the current user can browse: public ones plus their own.
    pub async fn events(&mut self) -> Result<Vec<Event>, StateError> {
        match self.backend.list_events().await {
            Ok(events) => Ok(events
                .into_iter()
                .filter(|e| e.is_listed_for(&self.user_id))
                .collect()),
            Err(err) => Err(self.fail("Failed to load events", err)),
        }
    }

    /// An event the current user may open by id, unlisted ones included.
    pub async fn event(&mut self, id: &str) -> Result<Event, StateError> {
        let events = match self.backend.list_events().await {
            Ok(events) => events,
            Err(err) => return Err(self.fail("Failed to load events", err)),
        };
        events
            .into_iter()
            .find(|e| e.id == id && e.is_visible_to(&self.user_id))
            .ok_or_else(|| StateError::EventNotFound(id.to_string()))
    }

    #[instrument(skip_all, fields(title = %new.title))]
    pub async fn add_event(&mut self, new: NewEvent) -> Result<Event, StateError> {
        let organizer = self.signed_in_user()?;
        if new.title.trim().is_empty() {
            return Err(StateError::Empty("event title"));
        }
        if new.end_time < new.start_time {
            return Err(StateError::EndsBeforeStart);
        }
        match self.backend.create_event(&organizer, new).await {
            Ok(event) => {
                info!(id = %event.id, "event created");
                Ok(event)
            }
            Err(err) => Err(self.fail("Failed to create event", err)),
        }
    }

    /// Mark an event cancelled, which closes registration. Organizer only.
    #[instrument(skip(self))]
    pub async fn cancel_event(&mut self, id: &str) -> Result<Event, StateError> {
        let user = self.signed_in_user()?;
        let mut event = self.event(id).await?;
        if event.organizer_id != user {
            return Err(StateError::NotOrganizer(id.to_string()));
        }
        event.status = EventStatus::Cancelled;
        match self.backend.update_event(event).await {
            Ok(saved) => {
                info!(id, "event cancelled");
                Ok(saved)
            }
            Err(err) => Err(self.fail("Failed to cancel event", err)),
        }
    }

    pub async fn event_guests(&mut self, event_id: &str) -> Result<Vec<EventGuest>, StateError> {
        match self.backend.list_event_guests(event_id).await {
            Ok(guests) => Ok(guests),
            Err(err) => Err(self.fail("Failed to load event guests", err)),
        }
    }

    /// The current user's registration for `event_id`. Guests never have one.
    pub async fn registration(&mut self, event_id: &str) -> Result<Option<EventGuest>, StateError> {
        if self.user_id == GUEST_USER_ID {
            return Ok(None);
        }
        let guests = self.event_guests(event_id).await?;
        Ok(guests.into_iter().find(|g| g.user_id == self.user_id))
    }

    pub async fn is_registered(&mut self, event_id: &str) -> Result<bool, StateError> {
        Ok(self.registration(event_id).await?.is_some())
    }

    /// Register the signed-in user as an accepted attendee. Registering
    /// again returns the existing registration.
    #[instrument(skip(self))]
    pub async fn register_for_event(&mut self, event_id: &str) -> Result<EventGuest, StateError> {
        let user = self.signed_in_user()?;
        let event = self.event(event_id).await?;
        if event.is_cancelled() {
            return Err(StateError::EventCancelled(event_id.to_string()));
        }
        let guests = self.event_guests(event_id).await?;
        if let Some(existing) = guests.iter().find(|g| g.user_id == user) {
            return Ok(existing.clone());
        }
        if let Some(limit) = event.max_attendees {
            let accepted = guests
                .iter()
                .filter(|g| g.status == GuestStatus::Accepted)
                .count();
            if accepted >= limit as usize {
                return Err(StateError::EventFull(event_id.to_string()));
            }
        }

        let guest = NewEventGuest {
            event_id: event_id.to_string(),
            user_id: user,
            email: None,
            status: GuestStatus::Accepted,
            role: GuestRole::Attendee,
        };
        match self.backend.create_event_guest(guest).await {
            Ok(created) => {
                info!(event_id, "registered for event");
                Ok(created)
            }
            Err(err) => Err(self.fail("Failed to register for event", err)),
        }
    }

    #[instrument(skip(self))]
    pub async fn cancel_registration(&mut self, event_id: &str) -> Result<(), StateError> {
        self.signed_in_user()?;
        let guest = self
            .registration(event_id)
            .await?
            .ok_or_else(|| StateError::NotRegistered(event_id.to_string()))?;
        if let Err(err) = self.backend.delete_event_guest(&guest.id).await {
            return Err(self.fail("Failed to cancel registration", err));
        }
        info!(event_id, "registration cancelled");
        Ok(())
    }

    // Internals.

    /// Apply `change` to one task, mirror it, and undo it if either step fails.
    async fn mutate_task<F>(
        &mut self,
        id: &str,
        context: &'static str,
        change: F,
    ) -> Result<Task, StateError>
    where
        F: FnOnce(&mut Task, DateTime<Utc>) -> Result<(), StateError>,
    {
        let index = self.task_index(id)?;
        let now = self.clock.now();
        let previous = self.tasks[index].clone();
        if let Err(err) = change(&mut self.tasks[index], now) {
            self.tasks[index] = previous;
            return Err(err);
        }

        let record = record_from_task(&self.tasks[index]);
        match self.backend.update_task(record).await {
            Ok(saved) => {
                self.adopt_task_stamps(std::slice::from_ref(&saved));
                Ok(self.tasks[index].clone())
            }
            Err(err) => {
                self.tasks[index] = previous;
                Err(self.fail(context, err))
            }
        }
    }

    /// Write `records` in order, collecting what the backend saved. Stops at
    /// the first failure.
    async fn persist_tasks(
        &self,
        records: Vec<TaskRecord>,
        saved: &mut Vec<TaskRecord>,
    ) -> anyhow::Result<()> {
        for record in records {
            saved.push(self.backend.update_task(record).await?);
        }
        Ok(())
    }

    /// Write the working-set copy of every task in `saved` back to the
    /// backend. Called after a compound change failed part way and the
    /// working set was already restored.
    async fn undo_task_writes(&mut self, saved: &[TaskRecord]) {
        let restore: Vec<TaskRecord> = saved
            .iter()
            .filter_map(|record| self.task(&record.id))
            .map(record_from_task)
            .collect();
        for record in restore {
            let id = record.id.clone();
            match self.backend.update_task(record).await {
                Ok(restored) => self.adopt_task_stamps(std::slice::from_ref(&restored)),
                Err(err) => warn!(id = %id, error = %err, "could not undo task write"),
            }
        }
    }

    /// The backend owns `updated_at`; keep the working set in step with it.
    fn adopt_task_stamps(&mut self, saved: &[TaskRecord]) {
        for record in saved {
            let Some(at) = parse_timestamp(&record.updated_at) else {
                continue;
            };
            if let Some(task) = self.tasks.iter_mut().find(|t| t.id == record.id) {
                task.updated_at = at;
            }
        }
    }

    fn signed_in_user(&self) -> Result<String, StateError> {
        if self.user_id == GUEST_USER_ID {
            return Err(StateError::SignInRequired);
        }
        Ok(self.user_id.clone())
    }

    fn fail(&mut self, context: &str, err: anyhow::Error) -> StateError {
        warn!(error = %err, backend = self.backend.name(), "{context}");
        self.last_error = Some(context.to_string());
        StateError::Persistence {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }

    fn task_index(&self, id: &str) -> Result<usize, StateError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| StateError::TaskNotFound(id.to_string()))
    }

    fn project_index(&self, id: &str) -> Result<usize, StateError> {
        self.projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| StateError::ProjectNotFound(id.to_string()))
    }

    fn next_task_position(&self) -> i64 {
        self.tasks
            .iter()
            .map(|t| t.position)
            .max()
            .map_or(0, |p| p + 1)
    }

    fn ensure_inbox(&mut self) {
        if !self.projects.iter().any(Project::is_inbox) {
            let inbox = Project::inbox(self.user_id.clone(), self.clock.now());
            self.projects.insert(0, inbox);
        }
    }
}

async fn resolve_user(identity: &dyn IdentityProvider) -> String {
    match identity.current_user().await {
        Ok(Some(id)) => id,
        Ok(None) => GUEST_USER_ID.to_string(),
        Err(err) => {
            warn!(provider = identity.name(), error = %err, "identity lookup failed, continuing as guest");
            GUEST_USER_ID.to_string()
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn missing_subtask(task_id: &str, subtask_id: &str) -> StateError {
    StateError::SubtaskNotFound {
        task_id: task_id.to_string(),
        subtask_id: subtask_id.to_string(),
    }
}

fn find_subtask(task: &Task, subtask_id: &str) -> Result<Subtask, StateError> {
    task.subtasks
        .iter()
        .find(|s| s.id == subtask_id)
        .cloned()
        .ok_or_else(|| missing_subtask(&task.id, subtask_id))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use flow_backend::StoreBackend;
    use flow_core::{
        backend::ProjectRecord,
        events::EventVisibility,
        filter::{ProjectFilter, SortField},
        focus::FocusStatus,
        identity::{GuestIdentity, StaticIdentity},
        storage::InMemoryStore,
        tasks::Priority,
    };

    use super::*;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        fn advance_minutes(&self, minutes: i64) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::minutes(minutes);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct BrokenIdentity;

    #[async_trait]
    impl IdentityProvider for BrokenIdentity {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn current_user(&self) -> anyhow::Result<Option<String>> {
            Err(anyhow!("session expired"))
        }
    }

    /// Which backend calls to refuse.
    #[derive(Default)]
    struct Faults {
        project_delete: AtomicBool,
        /// `update_task` calls let through before exactly one is refused.
        task_updates_before_refusal: Mutex<Option<usize>>,
    }

    impl Faults {
        fn refuse_task_update_after(&self, allowed: usize) {
            *self.task_updates_before_refusal.lock().unwrap() = Some(allowed);
        }

        fn refuses_task_update(&self) -> bool {
            let mut remaining = self.task_updates_before_refusal.lock().unwrap();
            match *remaining {
                Some(0) => {
                    *remaining = None;
                    true
                }
                Some(n) => {
                    *remaining = Some(n - 1);
                    false
                }
                None => false,
            }
        }
    }

    /// Refuses the calls named in `faults` and passes everything else to a
    /// `StoreBackend`.
    struct FlakyBackend {
        inner: StoreBackend<InMemoryStore>,
        faults: Arc<Faults>,
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn list_tasks(&self) -> anyhow::Result<Vec<TaskRecord>> {
            self.inner.list_tasks().await
        }

        async fn create_task(&self, record: TaskRecord) -> anyhow::Result<TaskRecord> {
            self.inner.create_task(record).await
        }

        async fn update_task(&self, record: TaskRecord) -> anyhow::Result<TaskRecord> {
            if self.faults.refuses_task_update() {
                return Err(anyhow!("task write refused"));
            }
            self.inner.update_task(record).await
        }

        async fn delete_task(&self, id: &str) -> anyhow::Result<()> {
            self.inner.delete_task(id).await
        }

        async fn list_projects(&self) -> anyhow::Result<Vec<ProjectRecord>> {
            self.inner.list_projects().await
        }

        async fn create_project(&self, record: ProjectRecord) -> anyhow::Result<ProjectRecord> {
            self.inner.create_project(record).await
        }

        async fn update_project(&self, record: ProjectRecord) -> anyhow::Result<ProjectRecord> {
            self.inner.update_project(record).await
        }

        async fn delete_project(&self, id: &str) -> anyhow::Result<()> {
            if self.faults.project_delete.load(Ordering::SeqCst) {
                return Err(anyhow!("project delete refused"));
            }
            self.inner.delete_project(id).await
        }

        async fn list_labels(&self) -> anyhow::Result<Vec<Label>> {
            self.inner.list_labels().await
        }

        async fn create_label(&self, label: NewLabel) -> anyhow::Result<Label> {
            self.inner.create_label(label).await
        }

        async fn update_label(&self, label: Label) -> anyhow::Result<Label> {
            self.inner.update_label(label).await
        }

        async fn delete_label(&self, id: &str) -> anyhow::Result<()> {
            self.inner.delete_label(id).await
        }

        async fn list_focus_sessions(&self) -> anyhow::Result<Vec<FocusSession>> {
            self.inner.list_focus_sessions().await
        }

        async fn create_focus_session(
            &self,
            user_id: &str,
            session: NewFocusSession,
        ) -> anyhow::Result<FocusSession> {
            self.inner.create_focus_session(user_id, session).await
        }

        async fn list_events(&self) -> anyhow::Result<Vec<Event>> {
            self.inner.list_events().await
        }

        async fn create_event(&self, organizer_id: &str, event: NewEvent) -> anyhow::Result<Event> {
            self.inner.create_event(organizer_id, event).await
        }

        async fn update_event(&self, event: Event) -> anyhow::Result<Event> {
            self.inner.update_event(event).await
        }

        async fn delete_event(&self, id: &str) -> anyhow::Result<()> {
            self.inner.delete_event(id).await
        }

        async fn list_event_guests(&self, event_id: &str) -> anyhow::Result<Vec<EventGuest>> {
            self.inner.list_event_guests(event_id).await
        }

        async fn create_event_guest(&self, guest: NewEventGuest) -> anyhow::Result<EventGuest> {
            self.inner.create_event_guest(guest).await
        }

        async fn delete_event_guest(&self, id: &str) -> anyhow::Result<()> {
            self.inner.delete_event_guest(id).await
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap()
    }

    struct Harness {
        store: TaskStore<StoreBackend<InMemoryStore>>,
        kv: InMemoryStore,
        clock: Arc<ManualClock>,
    }

    async fn harness() -> Harness {
        let kv = InMemoryStore::new();
        let clock = ManualClock::at(start());
        let mut store = TaskStore::with_clock(
            StoreBackend::new(kv.clone()),
            Arc::new(StaticIdentity::new("u1")),
            clock.clone(),
        );
        store.load().await.expect("load");
        Harness { store, kv, clock }
    }

    async fn store_for(kv: &InMemoryStore, user: &str) -> TaskStore<StoreBackend<InMemoryStore>> {
        let mut store = TaskStore::with_clock(
            StoreBackend::new(kv.clone()),
            Arc::new(StaticIdentity::new(user)),
            ManualClock::at(start()),
        );
        store.load().await.expect("load");
        store
    }

    async fn flaky_harness() -> (TaskStore<FlakyBackend>, InMemoryStore, Arc<Faults>) {
        let kv = InMemoryStore::new();
        let faults = Arc::new(Faults::default());
        let backend = FlakyBackend {
            inner: StoreBackend::new(kv.clone()),
            faults: faults.clone(),
        };
        let mut store = TaskStore::with_clock(
            backend,
            Arc::new(StaticIdentity::new("u1")),
            ManualClock::at(start()),
        );
        store.load().await.expect("load");
        (store, kv, faults)
    }

    fn positions<B: Backend>(store: &TaskStore<B>) -> Vec<(String, i64)> {
        let mut positions: Vec<(String, i64)> = store
            .tasks()
            .iter()
            .map(|t| (t.title.clone(), t.position))
            .collect();
        positions.sort();
        positions
    }

    #[tokio::test]
    async fn load_resolves_user_and_keeps_inbox() {
        let h = harness().await;
        assert_eq!(h.store.user_id(), "u1");
        assert!(h.store.project(INBOX_PROJECT_ID).is_some());
        assert_eq!(h.store.labels().len(), 6);
        assert!(h.store.tasks().is_empty());
    }

    #[tokio::test]
    async fn missing_or_broken_identity_means_guest() {
        let mut store = TaskStore::new(
            StoreBackend::new(InMemoryStore::new()),
            Arc::new(GuestIdentity),
        );
        store.load().await.expect("load");
        assert_eq!(store.user_id(), GUEST_USER_ID);

        let mut store = TaskStore::new(
            StoreBackend::new(InMemoryStore::new()),
            Arc::new(BrokenIdentity),
        );
        store.load().await.expect("load");
        assert_eq!(store.user_id(), GUEST_USER_ID);
    }

    #[tokio::test]
    async fn added_tasks_are_appended_and_persisted() {
        let mut h = harness().await;
        let first = h.store.add_task(NewTask::titled("Write docs")).await.expect("add");
        let second = h.store.add_task(NewTask::titled("Ship")).await.expect("add");

        assert_eq!(first.position, 0);
        assert_eq!(second.position, 1);
        assert_eq!(first.creator_id, "u1");
        assert_eq!(first.project(), INBOX_PROJECT_ID);

        let mut reloaded = TaskStore::new(StoreBackend::new(h.kv.clone()), Arc::new(GuestIdentity));
        reloaded.load().await.expect("reload");
        assert_eq!(reloaded.tasks().len(), 2);
        assert_eq!(reloaded.task(&second.id).map(|t| t.title.as_str()), Some("Ship"));
    }

    #[tokio::test]
    async fn blank_titles_and_unknown_projects_are_rejected() {
        let mut h = harness().await;
        assert_eq!(
            h.store.add_task(NewTask::titled("  ")).await,
            Err(StateError::Empty("task title"))
        );
        let new = NewTask {
            project_id: Some("ghost".into()),
            ..NewTask::titled("x")
        };
        assert_eq!(
            h.store.add_task(new).await,
            Err(StateError::ProjectNotFound("ghost".into()))
        );
        assert!(h.store.tasks().is_empty());
    }

    #[tokio::test]
    async fn completing_toggles_and_tracks_completion_time() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Ship")).await.expect("add");

        h.clock.advance_minutes(30);
        let done = h.store.complete_task(&task.id).await.expect("complete");
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.completed_at, Some(start() + chrono::Duration::minutes(30)));

        let reopened = h.store.complete_task(&task.id).await.expect("reopen");
        assert_eq!(reopened.status, TaskStatus::Todo);
        assert_eq!(reopened.completed_at, None);
    }

    #[tokio::test]
    async fn failed_update_is_reverted_and_reported() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Ship")).await.expect("add");

        h.kv.set_failing(Some("offline"));
        let err = h
            .store
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("Ship it".into()),
                    priority: Some(Priority::Urgent),
                    ..TaskPatch::default()
                },
            )
            .await
            .expect_err("backend down");

        assert!(matches!(err, StateError::Persistence { .. }));
        assert_eq!(h.store.last_error(), Some("Failed to update task"));
        let kept = h.store.task(&task.id).expect("still there");
        assert_eq!(kept.title, "Ship");
        assert_eq!(kept.priority, Priority::Medium);

        h.kv.set_failing(None);
        h.store.clear_error();
        let updated = h
            .store
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("Ship it".into()),
                    ..TaskPatch::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.title, "Ship it");
        assert_eq!(h.store.last_error(), None);
    }

    #[tokio::test]
    async fn failed_delete_restores_task_and_selection() {
        let mut h = harness().await;
        let a = h.store.add_task(NewTask::titled("a")).await.expect("add");
        let b = h.store.add_task(NewTask::titled("b")).await.expect("add");
        h.store.select_task(Some(&a.id));

        h.kv.set_failing(Some("offline"));
        h.store.delete_task(&a.id).await.expect_err("backend down");
        let order: Vec<&str> = h.store.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec![a.id.as_str(), b.id.as_str()]);
        assert_eq!(h.store.selected_task().map(|t| t.id.clone()), Some(a.id.clone()));

        h.kv.set_failing(None);
        h.store.delete_task(&a.id).await.expect("delete");
        assert!(h.store.task(&a.id).is_none());
        assert!(h.store.selected_task().is_none());
        assert_eq!(
            h.store.delete_task(&a.id).await,
            Err(StateError::TaskNotFound(a.id.clone()))
        );
    }

    #[tokio::test]
    async fn archived_tasks_leave_the_default_view() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Old")).await.expect("add");
        h.store.archive_task(&task.id, true).await.expect("archive");
        assert!(h.store.visible_tasks().is_empty());
        assert_eq!(h.store.tasks().len(), 1);
    }

    #[tokio::test]
    async fn reorder_assigns_positions_in_given_order() {
        let mut h = harness().await;
        let a = h.store.add_task(NewTask::titled("a")).await.expect("add");
        let b = h.store.add_task(NewTask::titled("b")).await.expect("add");
        let c = h.store.add_task(NewTask::titled("c")).await.expect("add");

        h.store
            .reorder_tasks(&[c.id.clone(), "unknown".into(), a.id.clone(), b.id.clone()])
            .await
            .expect("reorder");
        h.store.set_sort(TaskSort::asc(SortField::Position));
        let order: Vec<&str> = h.store.visible_tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn deleting_a_project_moves_its_tasks_to_inbox() {
        let mut h = harness().await;
        let project = h
            .store
            .add_project(NewProject {
                name: "Launch".into(),
                color: "#10b981".into(),
                ..NewProject::default()
            })
            .await
            .expect("project");
        let task = h
            .store
            .add_task(NewTask {
                project_id: Some(project.id.clone()),
                ..NewTask::titled("Press release")
            })
            .await
            .expect("task");
        assert_eq!(h.store.tasks_by_project(&project.id).len(), 1);
        h.store.select_project(Some(&project.id));

        h.store.delete_project(&project.id).await.expect("delete");
        assert!(h.store.project(&project.id).is_none());
        assert!(h.store.selected_project().is_none());
        assert_eq!(h.store.task(&task.id).map(Task::project), Some(INBOX_PROJECT_ID));

        assert_eq!(
            h.store.delete_project(INBOX_PROJECT_ID).await,
            Err(StateError::InboxIsReserved)
        );
    }

    #[tokio::test]
    async fn project_filter_uses_store_view_state() {
        let mut h = harness().await;
        let project = h
            .store
            .add_project(NewProject {
                name: "Launch".into(),
                ..NewProject::default()
            })
            .await
            .expect("project");
        h.store
            .add_task(NewTask {
                project_id: Some(project.id.clone()),
                ..NewTask::titled("in project")
            })
            .await
            .expect("task");
        h.store.add_task(NewTask::titled("in inbox")).await.expect("task");

        h.store.set_filter(TaskFilter {
            project: ProjectFilter::Is(project.id.clone()),
            ..TaskFilter::default()
        });
        let titles: Vec<&str> = h.store.visible_tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["in project"]);

        h.store.set_filter(TaskFilter::default());
        h.store.set_search("INBOX");
        assert_eq!(h.store.visible_tasks().len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_label_strips_it_from_tasks() {
        let mut h = harness().await;
        let task = h
            .store
            .add_task(NewTask {
                labels: vec!["label-1".into(), "label-2".into()],
                ..NewTask::titled("Fix crash")
            })
            .await
            .expect("task");

        h.store.delete_label("label-1").await.expect("delete");
        assert_eq!(h.store.labels().len(), 5);
        assert_eq!(
            h.store.task(&task.id).map(|t| t.labels.clone()),
            Some(vec!["label-2".to_string()])
        );
    }

    #[tokio::test]
    async fn failed_label_delete_restores_vocabulary_and_tasks() {
        let mut h = harness().await;
        let task = h
            .store
            .add_task(NewTask {
                labels: vec!["label-1".into()],
                ..NewTask::titled("Fix crash")
            })
            .await
            .expect("task");
        h.kv.set_failing(Some("offline"));
        h.store.delete_label("label-1").await.expect_err("offline");
        assert_eq!(h.store.labels().len(), 6);
        assert_eq!(h.store.labels()[0].id, "label-1");
        assert_eq!(h.store.task(&task.id).map(|t| t.labels.len()), Some(1));
    }

    #[tokio::test]
    async fn subtasks_and_comments_live_on_their_task() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Release")).await.expect("add");

        let subtask = h.store.add_subtask(&task.id, "Tag build").await.expect("subtask");
        assert!(!subtask.completed);

        let toggled = h
            .store
            .toggle_subtask(&task.id, &subtask.id)
            .await
            .expect("toggle");
        assert!(toggled.completed);
        assert!(toggled.completed_at.is_some());

        let renamed = h
            .store
            .update_subtask(
                &task.id,
                &subtask.id,
                SubtaskPatch {
                    title: Some("Tag and push".into()),
                    completed: Some(false),
                },
            )
            .await
            .expect("update");
        assert_eq!(renamed.title, "Tag and push");
        assert_eq!(renamed.completed_at, None);

        let comment = h.store.add_comment(&task.id, "LGTM").await.expect("comment");
        assert_eq!(comment.author_id, "u1");

        h.store.delete_subtask(&task.id, &subtask.id).await.expect("delete");
        let stored = h.store.task(&task.id).expect("task");
        assert!(stored.subtasks.is_empty());
        assert_eq!(stored.comments.len(), 1);

        assert_eq!(
            h.store.delete_subtask(&task.id, &subtask.id).await,
            Err(StateError::SubtaskNotFound {
                task_id: task.id.clone(),
                subtask_id: subtask.id.clone(),
            })
        );
    }

    #[tokio::test]
    async fn stats_reflect_the_working_set() {
        let mut h = harness().await;
        let due_today = NewTask {
            due_date: Some(start() + chrono::Duration::hours(3)),
            ..NewTask::titled("today")
        };
        h.store.add_task(due_today).await.expect("add");
        let done = h.store.add_task(NewTask::titled("done")).await.expect("add");
        h.store.complete_task(&done.id).await.expect("complete");

        let stats = h.store.stats(&start());
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.due_today, 1);
        assert_eq!(stats.completion_rate, 50);
    }

    #[tokio::test]
    async fn focus_sessions_are_attributed_to_the_user() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Deep work")).await.expect("add");
        let saved = h
            .store
            .record_focus_session(NewFocusSession {
                start_time: start(),
                end_time: start() + chrono::Duration::minutes(25),
                duration: 25,
                actual_duration: 25,
                task_id: Some(task.id.clone()),
                status: FocusStatus::Completed,
                notes: None,
            })
            .await
            .expect("record");
        assert_eq!(saved.user_id, "u1");
        assert_eq!(h.store.focus_sessions().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn status_changes_keep_completion_time_consistent() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Ship")).await.expect("add");

        let blocked = h
            .store
            .set_task_status(&task.id, TaskStatus::Blocked)
            .await
            .expect("status");
        assert_eq!(blocked.status, TaskStatus::Blocked);
        assert_eq!(blocked.completed_at, None);

        let done = h
            .store
            .set_task_status(&task.id, TaskStatus::Done)
            .await
            .expect("status");
        assert_eq!(done.completed_at, Some(start()));
    }

    #[tokio::test]
    async fn update_time_matches_the_backend_after_reload() {
        let mut h = harness().await;
        let task = h.store.add_task(NewTask::titled("Ship")).await.expect("add");
        h.clock.advance_minutes(5);
        let updated = h
            .store
            .update_task(
                &task.id,
                TaskPatch {
                    title: Some("Ship it".into()),
                    ..TaskPatch::default()
                },
            )
            .await
            .expect("update");

        let remote = store_for(&h.kv, "u1").await;
        assert_eq!(
            remote.task(&task.id).map(|t| t.updated_at),
            Some(updated.updated_at)
        );
        assert_eq!(h.store.task(&task.id).map(|t| t.updated_at), Some(updated.updated_at));
    }

    #[tokio::test]
    async fn failed_project_delete_leaves_tasks_in_the_project_remotely() {
        let (mut store, kv, faults) = flaky_harness().await;
        let project = store
            .add_project(NewProject {
                name: "Launch".into(),
                ..NewProject::default()
            })
            .await
            .expect("project");
        let task = store
            .add_task(NewTask {
                project_id: Some(project.id.clone()),
                ..NewTask::titled("Press release")
            })
            .await
            .expect("task");

        faults.project_delete.store(true, Ordering::SeqCst);
        let err = store.delete_project(&project.id).await.expect_err("refused");
        assert!(matches!(err, StateError::Persistence { .. }));
        assert_eq!(store.last_error(), Some("Failed to delete project"));
        assert_eq!(store.task(&task.id).map(Task::project), Some(project.id.as_str()));
        assert!(store.project(&project.id).is_some());

        let remote = store_for(&kv, "u1").await;
        assert_eq!(remote.task(&task.id).map(Task::project), Some(project.id.as_str()));
        assert!(remote.project(&project.id).is_some());
        assert_eq!(
            remote.task(&task.id).map(|t| t.updated_at),
            store.task(&task.id).map(|t| t.updated_at)
        );
    }

    #[tokio::test]
    async fn failed_reorder_writes_back_positions_already_saved() {
        let (mut store, kv, faults) = flaky_harness().await;
        let a = store.add_task(NewTask::titled("a")).await.expect("add");
        let b = store.add_task(NewTask::titled("b")).await.expect("add");
        let c = store.add_task(NewTask::titled("c")).await.expect("add");
        let before = positions(&store);

        // c is written, a is refused.
        faults.refuse_task_update_after(1);
        store
            .reorder_tasks(&[c.id.clone(), a.id.clone(), b.id.clone()])
            .await
            .expect_err("refused");

        assert_eq!(positions(&store), before);
        assert_eq!(positions(&store_for(&kv, "u1").await), before);
    }

    #[tokio::test]
    async fn failed_label_delete_part_way_keeps_the_label_everywhere() {
        let (mut store, kv, faults) = flaky_harness().await;
        for title in ["first", "second"] {
            store
                .add_task(NewTask {
                    labels: vec!["label-1".into()],
                    ..NewTask::titled(title)
                })
                .await
                .expect("task");
        }

        faults.refuse_task_update_after(1);
        store.delete_label("label-1").await.expect_err("refused");
        assert!(store.tasks().iter().all(|t| t.labels == ["label-1"]));

        let remote = store_for(&kv, "u1").await;
        assert_eq!(remote.labels().len(), 6);
        assert!(remote.tasks().iter().all(|t| t.labels == ["label-1"]));
    }

    fn meetup() -> NewEvent {
        NewEvent::new("Meetup", start(), start() + chrono::Duration::hours(2))
    }

    #[tokio::test]
    async fn guests_cannot_organize_or_register() {
        let kv = InMemoryStore::new();
        let mut host = store_for(&kv, "host").await;
        let event = host.add_event(meetup()).await.expect("event");

        let mut guest = TaskStore::new(StoreBackend::new(kv.clone()), Arc::new(GuestIdentity));
        guest.load().await.expect("load");
        assert_eq!(guest.add_event(meetup()).await, Err(StateError::SignInRequired));
        assert_eq!(
            guest.register_for_event(&event.id).await,
            Err(StateError::SignInRequired)
        );
        assert_eq!(guest.is_registered(&event.id).await, Ok(false));
        assert!(host.event_guests(&event.id).await.expect("guests").is_empty());
    }

    #[tokio::test]
    async fn registration_lifecycle() {
        let kv = InMemoryStore::new();
        let mut host = store_for(&kv, "host").await;
        let event = host.add_event(meetup()).await.expect("event");
        assert_eq!(event.organizer_id, "host");

        let mut attendee = store_for(&kv, "u1").await;
        assert_eq!(attendee.is_registered(&event.id).await, Ok(false));
        let guest = attendee.register_for_event(&event.id).await.expect("register");
        assert_eq!(guest.user_id, "u1");
        assert_eq!(guest.status, GuestStatus::Accepted);
        assert_eq!(guest.role, GuestRole::Attendee);
        assert_eq!(attendee.is_registered(&event.id).await, Ok(true));

        let again = attendee.register_for_event(&event.id).await.expect("register");
        assert_eq!(again.id, guest.id);
        assert_eq!(host.event_guests(&event.id).await.expect("guests").len(), 1);

        attendee.cancel_registration(&event.id).await.expect("cancel");
        assert_eq!(attendee.is_registered(&event.id).await, Ok(false));
        assert_eq!(
            attendee.cancel_registration(&event.id).await,
            Err(StateError::NotRegistered(event.id.clone()))
        );
        assert_eq!(
            attendee.register_for_event("missing").await,
            Err(StateError::EventNotFound("missing".into()))
        );
    }

    #[tokio::test]
    async fn cancelled_events_close_registration() {
        let kv = InMemoryStore::new();
        let mut host = store_for(&kv, "host").await;
        let event = host.add_event(meetup()).await.expect("event");
        let mut attendee = store_for(&kv, "u1").await;

        assert_eq!(
            attendee.cancel_event(&event.id).await,
            Err(StateError::NotOrganizer(event.id.clone()))
        );
        let cancelled = host.cancel_event(&event.id).await.expect("cancel");
        assert!(cancelled.is_cancelled());
        assert_eq!(
            attendee.register_for_event(&event.id).await,
            Err(StateError::EventCancelled(event.id.clone()))
        );
    }

    #[tokio::test]
    async fn full_events_turn_new_attendees_away() {
        let kv = InMemoryStore::new();
        let mut host = store_for(&kv, "host").await;
        let event = host
            .add_event(NewEvent {
                max_attendees: Some(1),
                ..meetup()
            })
            .await
            .expect("event");

        let mut first = store_for(&kv, "u1").await;
        first.register_for_event(&event.id).await.expect("register");
        let mut second = store_for(&kv, "u2").await;
        assert_eq!(
            second.register_for_event(&event.id).await,
            Err(StateError::EventFull(event.id.clone()))
        );
        // Already-registered users still get their registration back.
        assert!(first.register_for_event(&event.id).await.is_ok());
    }

    #[tokio::test]
    async fn visibility_limits_listing_and_lookup() {
        let kv = InMemoryStore::new();
        let mut host = store_for(&kv, "host").await;
        let private = host
            .add_event(NewEvent {
                visibility: EventVisibility::Private,
                ..meetup()
            })
            .await
            .expect("event");
        let unlisted = host
            .add_event(NewEvent {
                visibility: EventVisibility::Unlisted,
                ..meetup()
            })
            .await
            .expect("event");
        assert_eq!(host.events().await.expect("events").len(), 2);

        let mut other = store_for(&kv, "u1").await;
        assert!(other.events().await.expect("events").is_empty());
        assert_eq!(
            other.event(&private.id).await,
            Err(StateError::EventNotFound(private.id.clone()))
        );
        assert!(other.register_for_event(&unlisted.id).await.is_ok());
    }

    #[tokio::test]
    async fn events_are_validated_and_failures_recorded() {
        let mut h = harness().await;
        let backwards = NewEvent::new("Retro", start(), start() - chrono::Duration::hours(1));
        assert_eq!(h.store.add_event(backwards).await, Err(StateError::EndsBeforeStart));
        assert_eq!(
            h.store.add_event(NewEvent::new(" ", start(), start())).await,
            Err(StateError::Empty("event title"))
        );

        h.kv.set_failing(Some("offline"));
        let err = h.store.register_for_event("e1").await.expect_err("offline");
        assert!(matches!(err, StateError::Persistence { .. }));
        assert_eq!(h.store.last_error(), Some("Failed to load events"));
    }
}
