use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use flow_core::{
    events::EventVisibility,
    filter::SortField,
    tasks::{Priority, TaskStatus},
};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "flow",
    about = "Tasks, projects and focus sessions from the terminal",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Print machine-readable JSON instead of text where supported.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Run a health check against the data directory.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Create, list and change tasks.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Headline counts for today.
    Stats {
        /// Include the full dashboard breakdown.
        #[arg(long)]
        full: bool,
    },
    /// Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage labels.
    #[command(subcommand)]
    Label(LabelCommand),
    /// Focus sessions.
    #[command(subcommand)]
    Focus(FocusCommand),
    /// Browse, organize and register for events.
    #[command(subcommand)]
    Event(EventCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// List tasks matching the given filter.
    List(ListArgs),
    /// Add a task.
    Add(AddArgs),
    /// Toggle a task between done and todo.
    Done { id: String },
    /// Archive a task (or bring it back with --restore).
    Archive {
        id: String,
        #[arg(long)]
        restore: bool,
    },
    /// Delete a task permanently.
    Delete { id: String },
    /// Change fields of a task.
    Edit(EditArgs),
    /// Move a task to another status.
    Status { id: String, status: TaskStatus },
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Only these statuses (repeatable or comma separated).
    #[arg(long, value_delimiter = ',')]
    pub status: Vec<TaskStatus>,
    /// Only these priorities.
    #[arg(long, value_delimiter = ',')]
    pub priority: Vec<Priority>,
    /// Only tasks in this project.
    #[arg(long, conflicts_with = "no_project")]
    pub project: Option<String>,
    /// Only tasks with no project of their own (the inbox).
    #[arg(long)]
    pub no_project: bool,
    /// Tasks carrying any of these label ids.
    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,
    /// Require every given label instead of any.
    #[arg(long, requires = "label")]
    pub all_labels: bool,
    /// Hide done tasks.
    #[arg(long)]
    pub hide_completed: bool,
    /// Include archived tasks.
    #[arg(long)]
    pub archived: bool,
    /// Case-insensitive text search over title and description.
    #[arg(long)]
    pub search: Option<String>,
    /// Sort field; defaults to the configured view.
    #[arg(long)]
    pub sort: Option<SortField>,
    /// Sort descending.
    #[arg(long)]
    pub desc: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct AddArgs {
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    /// Due date as YYYY-MM-DD.
    #[arg(long)]
    pub due: Option<NaiveDate>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long, value_delimiter = ',')]
    pub label: Vec<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    #[arg(long)]
    pub priority: Option<Priority>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,
    #[arg(long)]
    pub clear_due: bool,
    #[arg(long)]
    pub project: Option<String>,
    /// Replace the task's labels.
    #[arg(long, value_delimiter = ',')]
    pub label: Option<Vec<String>>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProjectCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "#3b82f6")]
        color: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        favorite: bool,
    },
    /// Delete a project; its tasks move to the inbox.
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LabelCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "#6b7280")]
        color: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a label and remove it from every task.
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FocusCommand {
    /// Run a focus timer in the foreground; Ctrl-C stops it early.
    Start {
        task_id: Option<String>,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record a session that already happened, ending now.
    Log {
        task_id: String,
        #[arg(long)]
        minutes: u32,
        #[arg(long)]
        interrupted: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List recorded sessions.
    List,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum EventCommand {
    /// Public events plus the ones you organize.
    List,
    /// Create an event you organize.
    Add(EventArgs),
    /// Show one event and your registration.
    Show { id: String },
    Register { id: String },
    /// Withdraw your registration.
    Unregister { id: String },
    /// Cancel an event you organize; registration closes.
    Cancel { id: String },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct EventArgs {
    pub title: String,
    /// Start time as RFC 3339, e.g. 2025-07-01T18:00:00Z.
    #[arg(long)]
    pub start: DateTime<Utc>,
    /// Length in minutes.
    #[arg(long, default_value_t = 60)]
    pub minutes: u32,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long, default_value = "public")]
    pub visibility: EventVisibility,
    #[arg(long)]
    pub max_attendees: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse should succeed")
    }

    #[test]
    fn parses_health_subcommand() {
        assert_eq!(parse(&["flow", "health"]).command, Command::Health);
    }

    #[test]
    fn parses_config_init_subcommand() {
        assert_eq!(
            parse(&["flow", "config", "init"]).command,
            Command::Config(ConfigCommand::Init)
        );
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["flow"]).is_err());
    }

    #[test]
    fn parses_task_list_filters() {
        let cli = parse(&[
            "flow",
            "task",
            "list",
            "--status",
            "todo,in-progress",
            "--priority",
            "urgent",
            "--label",
            "bug",
            "--label",
            "ui",
            "--sort",
            "priority",
            "--desc",
            "--json",
        ]);
        assert!(cli.json);
        let Command::Task(TaskCommand::List(args)) = cli.command else {
            panic!("expected task list");
        };
        assert_eq!(args.status, vec![TaskStatus::Todo, TaskStatus::InProgress]);
        assert_eq!(args.priority, vec![Priority::Urgent]);
        assert_eq!(args.label, vec!["bug".to_string(), "ui".to_string()]);
        assert_eq!(args.sort, Some(SortField::Priority));
        assert!(args.desc);
    }

    #[test]
    fn project_and_no_project_conflict() {
        assert!(Cli::try_parse_from(["flow", "task", "list", "--project", "p1", "--no-project"])
            .is_err());
    }

    #[test]
    fn rejects_unknown_priority() {
        assert!(Cli::try_parse_from(["flow", "task", "add", "x", "--priority", "asap"]).is_err());
    }

    #[test]
    fn parses_task_add_with_due_date() {
        let cli = parse(&["flow", "task", "add", "Ship it", "--due", "2025-06-01"]);
        assert_eq!(
            cli.command,
            Command::Task(TaskCommand::Add(AddArgs {
                title: "Ship it".into(),
                due: NaiveDate::from_ymd_opt(2025, 6, 1),
                ..AddArgs::default()
            }))
        );
    }

    #[test]
    fn parses_focus_log() {
        let cli = parse(&["flow", "focus", "log", "t1", "--minutes", "20", "--interrupted"]);
        assert_eq!(
            cli.command,
            Command::Focus(FocusCommand::Log {
                task_id: "t1".into(),
                minutes: 20,
                interrupted: true,
                notes: None,
            })
        );
    }

    #[test]
    fn parses_task_status_and_focus_notes() {
        assert_eq!(
            parse(&["flow", "task", "status", "t1", "blocked"]).command,
            Command::Task(TaskCommand::Status {
                id: "t1".into(),
                status: TaskStatus::Blocked,
            })
        );
        assert_eq!(
            parse(&["flow", "focus", "start", "--notes", "deep work"]).command,
            Command::Focus(FocusCommand::Start {
                task_id: None,
                minutes: None,
                notes: Some("deep work".into()),
            })
        );
    }

    #[test]
    fn parses_event_add() {
        let cli = parse(&[
            "flow",
            "event",
            "add",
            "Meetup",
            "--start",
            "2025-07-01T18:00:00Z",
            "--visibility",
            "unlisted",
            "--max-attendees",
            "30",
        ]);
        let Command::Event(EventCommand::Add(args)) = cli.command else {
            panic!("expected event add");
        };
        assert_eq!(args.title, "Meetup");
        assert_eq!(args.minutes, 60);
        assert_eq!(args.visibility, EventVisibility::Unlisted);
        assert_eq!(args.max_attendees, Some(30));
        assert_eq!(args.start.to_rfc3339(), "2025-07-01T18:00:00+00:00");
    }

    #[test]
    fn event_add_requires_a_start() {
        assert!(Cli::try_parse_from(["flow", "event", "add", "Meetup"]).is_err());
    }
}
