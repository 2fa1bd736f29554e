use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use color_eyre::Result;
use flow_core::{
    backend::Backend,
    filter::{LabelMatch, ProjectFilter, SortDirection, TaskFilter, TaskSort},
    tasks::{NewTask, Task, TaskPatch, INBOX_PROJECT_ID},
};
use flow_state::TaskStore;

use crate::{
    cli::{AddArgs, EditArgs, ListArgs, TaskCommand},
    config::Config,
    output, storage,
};

/// Execute a task subcommand against the configured data directory.
pub async fn handle(cmd: TaskCommand, config: &Config, json: bool) -> Result<()> {
    let mut store = storage::open(config).await?;
    run(&mut store, cmd, json).await
}

async fn run<B: Backend>(store: &mut TaskStore<B>, cmd: TaskCommand, json: bool) -> Result<()> {
    match cmd {
        TaskCommand::List(args) => {
            let filter = filter_from_args(store.filter().clone(), &args);
            let sort = sort_from_args(*store.sort(), &args);
            store.set_filter(filter);
            store.set_sort(sort);
            let tasks = store.visible_tasks();
            if json {
                return output::json(&tasks);
            }
            if tasks.is_empty() {
                println!("No tasks match. Add one with `flow task add <title>`.");
                return Ok(());
            }
            for task in tasks {
                print_task(task);
            }
        }
        TaskCommand::Add(args) => {
            let task = store.add_task(new_task_from_args(args)).await?;
            report(&task, json, "Created task")?;
        }
        TaskCommand::Done { id } => {
            let task = store.complete_task(&id).await?;
            let verb = if task.is_done() { "Marked done" } else { "Reopened" };
            report(&task, json, verb)?;
        }
        TaskCommand::Archive { id, restore } => {
            let task = store.archive_task(&id, !restore).await?;
            let verb = if restore { "Restored" } else { "Archived" };
            report(&task, json, verb)?;
        }
        TaskCommand::Delete { id } => {
            store.delete_task(&id).await?;
            if !json {
                println!("Deleted task {id}");
            }
        }
        TaskCommand::Edit(args) => {
            let id = args.id.clone();
            let patch = patch_from_args(args);
            if patch.is_empty() {
                color_eyre::eyre::bail!("nothing to change; pass at least one field");
            }
            let task = store.update_task(&id, patch).await?;
            report(&task, json, "Updated")?;
        }
        TaskCommand::Status { id, status } => {
            let task = store.set_task_status(&id, status).await?;
            report(&task, json, "Moved")?;
        }
    }
    Ok(())
}

fn report(task: &Task, json: bool, verb: &str) -> Result<()> {
    if json {
        return output::json(task);
    }
    println!("{verb} {}: {}", task.id, task.title);
    Ok(())
}

fn print_task(task: &Task) {
    let archived = if task.is_archived { " (archived)" } else { "" };
    println!(
        "{} [{}] ({}) {}{archived}",
        task.id, task.status, task.priority, task.title
    );
    if let Some(desc) = &task.description {
        println!("    {desc}");
    }
    if let Some(due) = task.due_date {
        println!("    due: {}", due.with_timezone(&Local).format("%Y-%m-%d"));
    }
    if !task.labels.is_empty() {
        println!("    labels: {}", task.labels.join(", "));
    }
    if !task.subtasks.is_empty() {
        let done = task.subtasks.iter().filter(|s| s.completed).count();
        println!("    subtasks: {done}/{}", task.subtasks.len());
    }
}

/// Layer list flags over the configured base filter.
pub fn filter_from_args(base: TaskFilter, args: &ListArgs) -> TaskFilter {
    let mut filter = base;
    if !args.status.is_empty() {
        filter.status = args.status.clone();
    }
    if !args.priority.is_empty() {
        filter.priority = args.priority.clone();
    }
    if let Some(project) = &args.project {
        filter.project = ProjectFilter::Is(project.clone());
    } else if args.no_project {
        // Loaded tasks without a project tag always land in the inbox.
        filter.project = ProjectFilter::Is(INBOX_PROJECT_ID.to_string());
    }
    if !args.label.is_empty() {
        filter.labels = args.label.clone();
        filter.label_match = if args.all_labels {
            LabelMatch::All
        } else {
            LabelMatch::Any
        };
    }
    if args.hide_completed {
        filter.show_completed = false;
    }
    if args.archived {
        filter.show_archived = true;
    }
    if let Some(search) = &args.search {
        filter.search = Some(search.clone());
    }
    filter
}

pub fn sort_from_args(base: TaskSort, args: &ListArgs) -> TaskSort {
    let field = args.sort.unwrap_or(base.field);
    let direction = if args.desc {
        SortDirection::Desc
    } else if args.sort.is_some() {
        SortDirection::Asc
    } else {
        base.direction
    };
    TaskSort::new(field, direction)
}

fn new_task_from_args(args: AddArgs) -> NewTask {
    NewTask {
        description: args.description,
        status: args.status.unwrap_or_default(),
        priority: args.priority.unwrap_or_default(),
        project_id: args.project,
        labels: args.label,
        due_date: args.due.map(|date| start_of_local_day(date, &Local)),
        ..NewTask::titled(args.title)
    }
}

fn patch_from_args(args: EditArgs) -> TaskPatch {
    let description = match (args.description, args.clear_description) {
        (Some(text), _) => Some(Some(text)),
        (None, true) => Some(None),
        (None, false) => None,
    };
    let due_date = match (args.due, args.clear_due) {
        (Some(date), _) => Some(Some(start_of_local_day(date, &Local))),
        (None, true) => Some(None),
        (None, false) => None,
    };
    TaskPatch {
        title: args.title,
        description,
        status: args.status,
        priority: args.priority,
        project_id: args.project.map(Some),
        labels: args.label,
        due_date,
        ..TaskPatch::default()
    }
}

/// Midnight of `date` in `tz`; falls back to UTC midnight when the local
/// midnight does not exist.
fn start_of_local_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
