use chrono::{DateTime, Duration, Utc};
use flow_core::focus::{FocusStatus, NewFocusSession, DEFAULT_FOCUS_MINUTES};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FocusError {
    #[error("focus timer is not running")]
    NotRunning,
    #[error("focus timer is already running")]
    AlreadyRunning,
    #[error("focus timer is not paused")]
    NotPaused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Running {
        started: DateTime<Utc>,
        resumed_at: DateTime<Utc>,
        banked: Duration,
    },
    Paused {
        started: DateTime<Utc>,
        banked: Duration,
    },
}

/// Pomodoro-style countdown. Time spent paused does not count.
///
/// The timer never reads the clock itself; every transition takes `now`.
#[derive(Debug, Clone)]
pub struct FocusTimer {
    minutes: u32,
    task_id: Option<String>,
    notes: Option<String>,
    phase: Phase,
}

impl Default for FocusTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_MINUTES)
    }
}

impl FocusTimer {
    pub fn new(minutes: u32) -> Self {
        Self {
            minutes: minutes.max(1),
            task_id: None,
            notes: None,
            phase: Phase::Idle,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.phase, Phase::Paused { .. })
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), FocusError> {
        if self.phase != Phase::Idle {
            return Err(FocusError::AlreadyRunning);
        }
        self.phase = Phase::Running {
            started: now,
            resumed_at: now,
            banked: Duration::zero(),
        };
        debug!(minutes = self.minutes, task = ?self.task_id, "focus started");
        Ok(())
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), FocusError> {
        match self.phase {
            Phase::Running {
                started,
                resumed_at,
                banked,
            } => {
                self.phase = Phase::Paused {
                    started,
                    banked: banked + (now - resumed_at).max(Duration::zero()),
                };
                Ok(())
            }
            _ => Err(FocusError::NotRunning),
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), FocusError> {
        match self.phase {
            Phase::Paused { started, banked } => {
                self.phase = Phase::Running {
                    started,
                    resumed_at: now,
                    banked,
                };
                Ok(())
            }
            _ => Err(FocusError::NotPaused),
        }
    }

    /// Focused time so far, capped at the planned length.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let raw = match self.phase {
            Phase::Idle => Duration::zero(),
            Phase::Running {
                resumed_at, banked, ..
            } => banked + (now - resumed_at).max(Duration::zero()),
            Phase::Paused { banked, .. } => banked,
        };
        raw.min(self.planned())
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.planned() - self.elapsed(now)
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.phase != Phase::Idle && self.remaining(now) <= Duration::zero()
    }

    /// Stop the timer and describe the session to record. A session that
    /// ran its full length is completed; one stopped early is interrupted
    /// and keeps only whole minutes. Less than a minute records nothing.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<Option<NewFocusSession>, FocusError> {
        let started = match self.phase {
            Phase::Running { started, .. } | Phase::Paused { started, .. } => started,
            Phase::Idle => return Err(FocusError::NotRunning),
        };
        let finished = self.is_finished(now);
        let focused = u32::try_from(self.elapsed(now).num_minutes()).unwrap_or(0);
        self.phase = Phase::Idle;

        let (status, actual) = if finished {
            (FocusStatus::Completed, self.minutes)
        } else {
            (FocusStatus::Interrupted, focused)
        };
        if actual == 0 {
            debug!("focus stopped before a full minute, nothing to record");
            return Ok(None);
        }

        Ok(Some(NewFocusSession {
            start_time: started,
            end_time: now,
            duration: self.minutes,
            actual_duration: actual,
            task_id: self.task_id.clone(),
            status,
            notes: self.notes.clone(),
        }))
    }

    fn planned(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }
}
