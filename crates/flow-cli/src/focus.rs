use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use flow_core::{
    backend::Backend,
    focus::{FocusSession, FocusStatus, NewFocusSession},
};
use flow_state::{FocusTimer, TaskStore};
use tracing::info;

use crate::{cli::FocusCommand, config::Config, output, storage};

pub async fn handle(cmd: FocusCommand, config: &Config, json: bool) -> Result<()> {
    let mut store = storage::open(config).await?;
    match cmd {
        FocusCommand::Start {
            task_id,
            minutes,
            notes,
        } => {
            let minutes = minutes.unwrap_or_else(|| config.focus.minutes());
            let mut timer = FocusTimer::new(minutes);
            if let Some(task_id) = task_id {
                timer = timer.with_task(task_id);
            }
            if let Some(notes) = notes {
                timer = timer.with_notes(notes);
            }
            run_timer(&mut store, timer, json).await
        }
        FocusCommand::Log {
            task_id,
            minutes,
            interrupted,
            notes,
        } => {
            let mut session =
                logged_session(task_id, minutes, config.focus.minutes(), interrupted, Utc::now());
            session.notes = notes;
            let saved = store.record_focus_session(session).await?;
            print_session(&saved, json)
        }
        FocusCommand::List => {
            let sessions = store.focus_sessions().await?;
            if json {
                return output::json(&sessions);
            }
            if sessions.is_empty() {
                println!("No focus sessions recorded yet.");
            }
            for session in &sessions {
                print_line(session);
            }
            Ok(())
        }
    }
}

/// Run the timer in the foreground until it completes or Ctrl-C stops it.
async fn run_timer<B: Backend>(store: &mut TaskStore<B>, mut timer: FocusTimer, json: bool) -> Result<()> {
    timer.start(Utc::now())?;
    let planned = timer.remaining(Utc::now()).to_std()?;
    println!("Focusing for {} minutes. Ctrl-C to stop early.", timer.minutes());

    tokio::select! {
        _ = tokio::time::sleep(planned) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            println!();
        }
    }

    match timer.stop(Utc::now())? {
        Some(session) => {
            info!(status = %session.status, minutes = session.actual_duration, "focus session finished");
            let saved = store.record_focus_session(session).await?;
            print_session(&saved, json)
        }
        None => {
            println!("Stopped before a full minute; nothing recorded.");
            Ok(())
        }
    }
}

/// A session of `minutes` that ended at `now`.
fn logged_session(
    task_id: String,
    minutes: u32,
    planned: u32,
    interrupted: bool,
    now: DateTime<Utc>,
) -> NewFocusSession {
    let (status, duration) = if interrupted {
        (FocusStatus::Interrupted, planned.max(minutes))
    } else {
        (FocusStatus::Completed, minutes)
    };
    NewFocusSession {
        start_time: now - Duration::minutes(i64::from(minutes)),
        end_time: now,
        duration,
        actual_duration: minutes,
        task_id: Some(task_id),
        status,
        notes: None,
    }
}

fn print_session(session: &FocusSession, json: bool) -> Result<()> {
    if json {
        return output::json(session);
    }
    print_line(session);
    Ok(())
}

fn print_line(session: &FocusSession) {
    let actual = session.actual_duration.unwrap_or(0);
    let task = session.task_id.as_deref().unwrap_or("-");
    println!(
        "{} {} {}/{} min task {} ({})",
        session.id,
        session.start_time.format("%Y-%m-%d %H:%M"),
        actual,
        session.duration,
        task,
        session.status
    );
}
