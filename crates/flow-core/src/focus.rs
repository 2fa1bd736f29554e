use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasks::ParseEnumError;

/// Default length of a focus session, in minutes.
pub const DEFAULT_FOCUS_MINUTES: u32 = 25;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FocusStatus {
    #[default]
    Active,
    Completed,
    Interrupted,
}

impl FocusStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FocusStatus::Active => "active",
            FocusStatus::Completed => "completed",
            FocusStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for FocusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FocusStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(FocusStatus::Active),
            "completed" => Ok(FocusStatus::Completed),
            "interrupted" => Ok(FocusStatus::Interrupted),
            _ => Err(ParseEnumError::new("focus status", s)),
        }
    }
}

/// A finished (or abandoned) stretch of focused work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Planned minutes.
    pub duration: u32,
    /// Minutes actually spent.
    #[serde(default)]
    pub actual_duration: Option<u32>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: FocusStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Session about to be persisted; the backend assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFocusSession {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u32,
    pub actual_duration: u32,
    pub task_id: Option<String>,
    pub status: FocusStatus,
    pub notes: Option<String>,
}
