use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use flow_core::{
    backend::{Backend, ProjectRecord, TaskRecord},
    events::{Event, EventGuest, EventStatus, NewEvent, NewEventGuest},
    focus::{FocusSession, NewFocusSession},
    labels::{default_labels, Label, NewLabel},
    storage::{KvStore, StoreError},
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::mapping::format_timestamp;

const TASKS_KEY: &str = "tasks";
const PROJECTS_KEY: &str = "projects";
const LABELS_KEY: &str = "labels";
const FOCUS_SESSIONS_KEY: &str = "focus_sessions";
const EVENTS_KEY: &str = "events";
const EVENT_GUESTS_KEY: &str = "event_guests";

/// Persistence collaborator backed by a `KvStore`. Each collection is one
/// JSON array under its own key; the backend assigns ids and system
/// timestamps on create.
pub struct StoreBackend<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> StoreBackend<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Vec<T>>> {
        match self.store.get(key).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(err) => Err(anyhow!(err.to_string())),
        }
    }

    async fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let bytes = serde_json::to_vec(items)?;
        self.store
            .put(key, &bytes)
            .await
            .map_err(|e| anyhow!(e.to_string()))
    }

    async fn load_or_empty<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.load(key).await?.unwrap_or_default())
    }

    async fn labels(&self) -> Result<Vec<Label>> {
        match self.load(LABELS_KEY).await? {
            Some(labels) => Ok(labels),
            None => {
                debug!("no labels stored yet, seeding defaults");
                Ok(default_labels())
            }
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn not_found(kind: &str, id: &str) -> anyhow::Error {
    anyhow!("{kind} not found: {id}")
}

#[async_trait]
impl<S: KvStore> Backend for StoreBackend<S> {
    fn name(&self) -> &'static str {
        "store"
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        self.load_or_empty(TASKS_KEY).await
    }

    #[instrument(skip_all, fields(title = %record.title))]
    async fn create_task(&self, mut record: TaskRecord) -> Result<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.load_or_empty(TASKS_KEY).await?;
        let now = format_timestamp(Utc::now());
        record.id = new_id();
        record.created_at = now.clone();
        record.updated_at = now;
        records.push(record.clone());
        self.save(TASKS_KEY, &records).await?;
        Ok(record)
    }

    #[instrument(skip_all, fields(id = %record.id))]
    async fn update_task(&self, mut record: TaskRecord) -> Result<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.load_or_empty(TASKS_KEY).await?;
        let slot = records
            .iter_mut()
            .find(|existing| existing.id == record.id)
            .ok_or_else(|| not_found("task", &record.id))?;
        record.created_at = slot.created_at.clone();
        record.updated_at = format_timestamp(Utc::now());
        *slot = record.clone();
        self.save(TASKS_KEY, &records).await?;
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, id: &str) -> Result<()> {
        let mut records: Vec<TaskRecord> = self.load_or_empty(TASKS_KEY).await?;
        let before = records.len();
        records.retain(|existing| existing.id != id);
        if records.len() == before {
            return Err(not_found("task", id));
        }
        self.save(TASKS_KEY, &records).await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        self.load_or_empty(PROJECTS_KEY).await
    }

    #[instrument(skip_all, fields(name = %record.name))]
    async fn create_project(&self, mut record: ProjectRecord) -> Result<ProjectRecord> {
        let mut records: Vec<ProjectRecord> = self.load_or_empty(PROJECTS_KEY).await?;
        let now = format_timestamp(Utc::now());
        record.id = new_id();
        record.created_at = now.clone();
        record.updated_at = now;
        records.push(record.clone());
        self.save(PROJECTS_KEY, &records).await?;
        Ok(record)
    }

    #[instrument(skip_all, fields(id = %record.id))]
    async fn update_project(&self, mut record: ProjectRecord) -> Result<ProjectRecord> {
        let mut records: Vec<ProjectRecord> = self.load_or_empty(PROJECTS_KEY).await?;
        let slot = records
            .iter_mut()
            .find(|existing| existing.id == record.id)
            .ok_or_else(|| not_found("project", &record.id))?;
        record.created_at = slot.created_at.clone();
        record.updated_at = format_timestamp(Utc::now());
        *slot = record.clone();
        self.save(PROJECTS_KEY, &records).await?;
        Ok(record)
    }

    #[instrument(skip(self))]
    async fn delete_project(&self, id: &str) -> Result<()> {
        let mut records: Vec<ProjectRecord> = self.load_or_empty(PROJECTS_KEY).await?;
        let before = records.len();
        records.retain(|existing| existing.id != id);
        if records.len() == before {
            return Err(not_found("project", id));
        }
        self.save(PROJECTS_KEY, &records).await
    }

    #[instrument(skip(self))]
    async fn list_labels(&self) -> Result<Vec<Label>> {
        self.labels().await
    }

    #[instrument(skip_all, fields(name = %label.name))]
    async fn create_label(&self, label: NewLabel) -> Result<Label> {
        let mut labels = self.labels().await?;
        let created = Label {
            id: new_id(),
            name: label.name,
            color: label.color,
            description: label.description,
        };
        labels.push(created.clone());
        self.save(LABELS_KEY, &labels).await?;
        Ok(created)
    }

    #[instrument(skip_all, fields(id = %label.id))]
    async fn update_label(&self, label: Label) -> Result<Label> {
        let mut labels = self.labels().await?;
        let slot = labels
            .iter_mut()
            .find(|existing| existing.id == label.id)
            .ok_or_else(|| not_found("label", &label.id))?;
        *slot = label.clone();
        self.save(LABELS_KEY, &labels).await?;
        Ok(label)
    }

    #[instrument(skip(self))]
    async fn delete_label(&self, id: &str) -> Result<()> {
        let mut labels = self.labels().await?;
        let before = labels.len();
        labels.retain(|existing| existing.id != id);
        if labels.len() == before {
            return Err(not_found("label", id));
        }
        self.save(LABELS_KEY, &labels).await
    }

    #[instrument(skip(self))]
    async fn list_focus_sessions(&self) -> Result<Vec<FocusSession>> {
        self.load_or_empty(FOCUS_SESSIONS_KEY).await
    }

    #[instrument(skip(self, session), fields(status = %session.status))]
    async fn create_focus_session(
        &self,
        user_id: &str,
        session: NewFocusSession,
    ) -> Result<FocusSession> {
        let mut sessions: Vec<FocusSession> = self.load_or_empty(FOCUS_SESSIONS_KEY).await?;
        let created = FocusSession {
            id: new_id(),
            user_id: user_id.to_string(),
            start_time: session.start_time,
            end_time: Some(session.end_time),
            duration: session.duration,
            actual_duration: Some(session.actual_duration),
            task_id: session.task_id,
            status: session.status,
            notes: session.notes,
        };
        sessions.push(created.clone());
        self.save(FOCUS_SESSIONS_KEY, &sessions).await?;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list_events(&self) -> Result<Vec<Event>> {
        self.load_or_empty(EVENTS_KEY).await
    }

    #[instrument(skip(self, event), fields(title = %event.title))]
    async fn create_event(&self, organizer_id: &str, event: NewEvent) -> Result<Event> {
        let mut events: Vec<Event> = self.load_or_empty(EVENTS_KEY).await?;
        let now = Utc::now();
        let created = Event {
            id: new_id(),
            title: event.title,
            description: event.description,
            start_time: event.start_time,
            end_time: event.end_time,
            location: event.location,
            meeting_url: event.meeting_url,
            cover_image_id: None,
            visibility: event.visibility,
            status: EventStatus::Confirmed,
            max_attendees: event.max_attendees,
            organizer_id: organizer_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        events.push(created.clone());
        self.save(EVENTS_KEY, &events).await?;
        Ok(created)
    }

    #[instrument(skip_all, fields(id = %event.id))]
    async fn update_event(&self, mut event: Event) -> Result<Event> {
        let mut events: Vec<Event> = self.load_or_empty(EVENTS_KEY).await?;
        let slot = events
            .iter_mut()
            .find(|existing| existing.id == event.id)
            .ok_or_else(|| not_found("event", &event.id))?;
        event.created_at = slot.created_at;
        event.updated_at = Utc::now();
        *slot = event.clone();
        self.save(EVENTS_KEY, &events).await?;
        Ok(event)
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: &str) -> Result<()> {
        let mut events: Vec<Event> = self.load_or_empty(EVENTS_KEY).await?;
        let before = events.len();
        events.retain(|existing| existing.id != id);
        if events.len() == before {
            return Err(not_found("event", id));
        }
        let mut guests: Vec<EventGuest> = self.load_or_empty(EVENT_GUESTS_KEY).await?;
        let guests_before = guests.len();
        guests.retain(|guest| guest.event_id != id);
        if guests.len() != guests_before {
            self.save(EVENT_GUESTS_KEY, &guests).await?;
        }
        self.save(EVENTS_KEY, &events).await
    }

    #[instrument(skip(self))]
    async fn list_event_guests(&self, event_id: &str) -> Result<Vec<EventGuest>> {
        let guests: Vec<EventGuest> = self.load_or_empty(EVENT_GUESTS_KEY).await?;
        Ok(guests
            .into_iter()
            .filter(|guest| guest.event_id == event_id)
            .collect())
    }

    #[instrument(skip_all, fields(event_id = %guest.event_id))]
    async fn create_event_guest(&self, guest: NewEventGuest) -> Result<EventGuest> {
        let mut guests: Vec<EventGuest> = self.load_or_empty(EVENT_GUESTS_KEY).await?;
        let created = EventGuest {
            id: new_id(),
            event_id: guest.event_id,
            user_id: guest.user_id,
            email: guest.email,
            status: guest.status,
            role: guest.role,
            created_at: Utc::now(),
        };
        guests.push(created.clone());
        self.save(EVENT_GUESTS_KEY, &guests).await?;
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn delete_event_guest(&self, id: &str) -> Result<()> {
        let mut guests: Vec<EventGuest> = self.load_or_empty(EVENT_GUESTS_KEY).await?;
        let before = guests.len();
        guests.retain(|existing| existing.id != id);
        if guests.len() == before {
            return Err(not_found("event guest", id));
        }
        self.save(EVENT_GUESTS_KEY, &guests).await
    }
}
