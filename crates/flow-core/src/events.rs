use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::ParseEnumError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Confirmed => "confirmed",
            EventStatus::Tentative => "tentative",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who can see an event.
///
/// Public events are listed for everyone. Unlisted events can be opened by
/// id but are never listed. Private events exist only for their organizer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventVisibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl EventVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            EventVisibility::Public => "public",
            EventVisibility::Unlisted => "unlisted",
            EventVisibility::Private => "private",
        }
    }
}

impl fmt::Display for EventVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventVisibility {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(EventVisibility::Public),
            "unlisted" => Ok(EventVisibility::Unlisted),
            "private" => Ok(EventVisibility::Private),
            _ => Err(ParseEnumError::new("event visibility", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GuestStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GuestRole {
    #[default]
    Attendee,
    Organizer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Physical place; absent means the event is online.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub meeting_url: Option<String>,
    #[serde(default)]
    pub cover_image_id: Option<String>,
    #[serde(default)]
    pub visibility: EventVisibility,
    #[serde(default)]
    pub status: EventStatus,
    /// Cap on accepted guests; absent means unlimited.
    #[serde(default)]
    pub max_attendees: Option<u32>,
    pub organizer_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }

    /// Whether `user_id` may open the event by id.
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        self.visibility != EventVisibility::Private || self.organizer_id == user_id
    }

    /// Whether the event shows up when `user_id` browses events.
    pub fn is_listed_for(&self, user_id: &str) -> bool {
        self.visibility == EventVisibility::Public || self.organizer_id == user_id
    }
}

/// Event about to be persisted; the backend assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
    pub visibility: EventVisibility,
    pub max_attendees: Option<u32>,
}

impl NewEvent {
    pub fn new(title: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: None,
            start_time,
            end_time,
            location: None,
            meeting_url: None,
            visibility: EventVisibility::default(),
            max_attendees: None,
        }
    }
}

/// A user's registration for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventGuest {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: GuestStatus,
    #[serde(default)]
    pub role: GuestRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEventGuest {
    pub event_id: String,
    pub user_id: String,
    pub email: Option<String>,
    pub status: GuestStatus,
    pub role: GuestRole,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn event(visibility: EventVisibility) -> Event {
        let at = Utc.with_ymd_and_hms(2025, 7, 1, 18, 0, 0).unwrap();
        Event {
            id: "e1".into(),
            title: "Launch party".into(),
            description: None,
            start_time: at,
            end_time: at + chrono::Duration::hours(2),
            location: None,
            meeting_url: None,
            cover_image_id: None,
            visibility,
            status: EventStatus::Confirmed,
            max_attendees: None,
            organizer_id: "host".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn visibility_controls_listing_and_access() {
        let public = event(EventVisibility::Public);
        assert!(public.is_listed_for("someone"));
        assert!(public.is_visible_to("someone"));

        let unlisted = event(EventVisibility::Unlisted);
        assert!(!unlisted.is_listed_for("someone"));
        assert!(unlisted.is_visible_to("someone"));
        assert!(unlisted.is_listed_for("host"));

        let private = event(EventVisibility::Private);
        assert!(!private.is_visible_to("someone"));
        assert!(private.is_visible_to("host"));
    }

    #[test]
    fn reads_stored_guest_with_defaults() {
        let json = r#"{
            "id": "g1",
            "eventId": "e1",
            "userId": "u1",
            "createdAt": "2025-07-01T10:00:00Z"
        }"#;
        let guest: EventGuest = serde_json::from_str(json).expect("parse");
        assert_eq!(guest.status, GuestStatus::Pending);
        assert_eq!(guest.role, GuestRole::Attendee);
        assert_eq!(guest.email, None);
    }

    #[test]
    fn visibility_parses_case_insensitively() {
        assert_eq!("Unlisted".parse::<EventVisibility>(), Ok(EventVisibility::Unlisted));
        assert!("secret".parse::<EventVisibility>().is_err());
    }
}
