use thiserror::Error;

/// Failures surfaced by the state container.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("subtask {subtask_id} not found on task {task_id}")]
    SubtaskNotFound { task_id: String, subtask_id: String },
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("label not found: {0}")]
    LabelNotFound(String),
    #[error("the inbox project is reserved")]
    InboxIsReserved,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("event not found: {0}")]
    EventNotFound(String),
    #[error("event {0} is cancelled")]
    EventCancelled(String),
    #[error("event {0} has no spots left")]
    EventFull(String),
    #[error("not registered for event {0}")]
    NotRegistered(String),
    #[error("only the organizer can change event {0}")]
    NotOrganizer(String),
    #[error("an event cannot end before it starts")]
    EndsBeforeStart,
    /// Guests have no stable identity to register or organize with.
    #[error("sign in first")]
    SignInRequired,
    /// The persistence collaborator rejected a change; the local working
    /// set has already been put back.
    #[error("{context}: {reason}")]
    Persistence { context: String, reason: String },
}
