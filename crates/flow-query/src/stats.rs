use std::collections::BTreeMap;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use flow_core::tasks::{Priority, Task, TaskStatus};
use serde::Serialize;

use crate::select::compare_titles;

/// Headline counts over the non-archived part of the working set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    /// Not done, due before the start of the reference day.
    pub overdue: usize,
    /// Not done, due within the reference day.
    pub due_today: usize,
    /// Percentage of completed tasks, rounded half up; 0 when empty.
    pub completion_rate: u32,
}

/// Everything the dashboard shows beyond [`Stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dashboard {
    pub stats: Stats,
    pub due_tomorrow: usize,
    pub due_this_week: usize,
    pub in_progress: usize,
    pub blocked: usize,
    /// Open tasks per priority, urgent first.
    pub by_priority: Vec<(Priority, usize)>,
    /// Open tasks per owning project.
    pub by_project: BTreeMap<String, usize>,
    /// Open tasks per label.
    pub by_label: BTreeMap<String, usize>,
    /// Mean hours from creation to completion over completed tasks.
    pub average_completion_hours: Option<f64>,
}

/// Derive headline stats relative to `reference`. The day boundaries are
/// taken in the reference's own time zone.
pub fn derive_stats<Tz: TimeZone>(tasks: &[Task], reference: &DateTime<Tz>) -> Stats {
    let today = start_of_day(reference);
    let tomorrow = today + Duration::days(1);

    let mut stats = Stats::default();
    for task in tasks.iter().filter(|t| !t.is_archived) {
        stats.total += 1;
        if task.is_done() {
            stats.completed += 1;
            continue;
        }
        if let Some(due) = task.due_date {
            if due < today {
                stats.overdue += 1;
            } else if due < tomorrow {
                stats.due_today += 1;
            }
        }
    }
    stats.completion_rate = percent(stats.completed, stats.total);
    stats
}

pub fn derive_dashboard<Tz: TimeZone>(tasks: &[Task], reference: &DateTime<Tz>) -> Dashboard {
    let stats = derive_stats(tasks, reference);
    let tomorrow = start_of_day(reference) + Duration::days(1);
    let day_after = tomorrow + Duration::days(1);
    let week_start = start_of_week(reference);
    let week_end = week_start + Duration::days(7);

    let mut dashboard = Dashboard {
        stats,
        by_priority: Priority::ALL
            .into_iter()
            .rev()
            .map(|priority| (priority, 0))
            .collect(),
        ..Dashboard::default()
    };
    let mut completion_hours = Vec::new();

    for task in tasks.iter().filter(|t| !t.is_archived) {
        if task.is_done() {
            if let Some(completed_at) = task.completed_at {
                let elapsed = completed_at - task.created_at;
                completion_hours.push(elapsed.num_seconds() as f64 / 3600.0);
            }
            continue;
        }
        match task.status {
            TaskStatus::InProgress => dashboard.in_progress += 1,
            TaskStatus::Blocked => dashboard.blocked += 1,
            _ => {}
        }
        if let Some(due) = task.due_date {
            if due >= tomorrow && due < day_after {
                dashboard.due_tomorrow += 1;
            }
            if due >= week_start && due < week_end {
                dashboard.due_this_week += 1;
            }
        }
        if let Some(slot) = dashboard
            .by_priority
            .iter_mut()
            .find(|(priority, _)| *priority == task.priority)
        {
            slot.1 += 1;
        }
        *dashboard
            .by_project
            .entry(task.project().to_string())
            .or_default() += 1;
        for label in &task.labels {
            *dashboard.by_label.entry(label.clone()).or_default() += 1;
        }
    }

    if !completion_hours.is_empty() {
        let sum: f64 = completion_hours.iter().sum();
        dashboard.average_completion_hours = Some(sum / completion_hours.len() as f64);
    }
    dashboard
}

/// Non-archived tasks owned by `project_id`, in input order.
pub fn tasks_by_project<'a>(tasks: &'a [Task], project_id: &str) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| !t.is_archived && t.project() == project_id)
        .collect()
}

/// Completion percentage of a project's non-archived tasks.
pub fn project_progress(tasks: &[Task], project_id: &str) -> u32 {
    let owned = tasks_by_project(tasks, project_id);
    let done = owned.iter().filter(|t| t.is_done()).count();
    percent(done, owned.len())
}

/// Earliest-due open tasks, at most `limit`.
pub fn upcoming(tasks: &[Task], limit: usize) -> Vec<&Task> {
    let mut open: Vec<&Task> = open_tasks(tasks).filter(|t| t.due_date.is_some()).collect();
    open.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then_with(|| compare_titles(&a.title, &b.title))
    });
    open.truncate(limit);
    open
}

/// Most recently touched open tasks, at most `limit`.
pub fn recently_updated(tasks: &[Task], limit: usize) -> Vec<&Task> {
    let mut open: Vec<&Task> = open_tasks(tasks).collect();
    open.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    open.truncate(limit);
    open
}

fn open_tasks(tasks: &[Task]) -> impl Iterator<Item = &Task> {
    tasks.iter().filter(|t| !t.is_archived && !t.is_done())
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part * 200 + whole) / (whole * 2)) as u32
}

/// Midnight of the reference's local day, as a UTC instant.
pub fn start_of_day<Tz: TimeZone>(reference: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = reference.date_naive().and_time(NaiveTime::MIN);
    match reference.timezone().from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(first, second) => {
            let earliest = if first <= second { first } else { second };
            earliest.with_timezone(&Utc)
        }
        // Midnight skipped by a DST jump; the day starts at the first local
        // instant after the gap.
        LocalResult::None => first_instant_after_gap(reference, midnight),
    }
}

const GAP_STEP_MINUTES: i64 = 15;
const GAP_SEARCH_STEPS: i64 = 24 * 60 / GAP_STEP_MINUTES;

fn first_instant_after_gap<Tz: TimeZone>(
    reference: &DateTime<Tz>,
    midnight: NaiveDateTime,
) -> DateTime<Utc> {
    let tz = reference.timezone();
    (1..=GAP_SEARCH_STEPS)
        .map(|step| midnight + Duration::minutes(GAP_STEP_MINUTES * step))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| {
            let offset = reference.offset().fix().local_minus_utc();
            (midnight - Duration::seconds(i64::from(offset))).and_utc()
        })
}

/// Start of the Sunday-based week containing the reference.
fn start_of_week<Tz: TimeZone>(reference: &DateTime<Tz>) -> DateTime<Utc> {
    let back = reference.weekday().num_days_from_sunday();
    start_of_day(reference) - Duration::days(i64::from(back))
}
