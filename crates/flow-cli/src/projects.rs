use color_eyre::Result;
use flow_core::{backend::Backend, labels::NewLabel, projects::NewProject};
use flow_query::stats::project_progress;
use flow_state::TaskStore;
use serde::Serialize;

use crate::{
    cli::{LabelCommand, ProjectCommand},
    config::Config,
    output, storage,
};

#[derive(Serialize)]
struct ProjectRow<'a> {
    id: &'a str,
    name: &'a str,
    color: &'a str,
    favorite: bool,
    tasks: usize,
    progress: u32,
}

pub async fn handle_project(cmd: ProjectCommand, config: &Config, json: bool) -> Result<()> {
    let mut store = storage::open(config).await?;
    run_project(&mut store, cmd, json).await
}

pub async fn handle_label(cmd: LabelCommand, config: &Config, json: bool) -> Result<()> {
    let mut store = storage::open(config).await?;
    run_label(&mut store, cmd, json).await
}

async fn run_project<B: Backend>(
    store: &mut TaskStore<B>,
    cmd: ProjectCommand,
    json: bool,
) -> Result<()> {
    match cmd {
        ProjectCommand::List => {
            let rows: Vec<ProjectRow<'_>> = store
                .projects()
                .iter()
                .map(|p| ProjectRow {
                    id: &p.id,
                    name: &p.name,
                    color: &p.color,
                    favorite: p.is_favorite,
                    tasks: store.tasks_by_project(&p.id).len(),
                    progress: project_progress(store.tasks(), &p.id),
                })
                .collect();
            if json {
                return output::json(&rows);
            }
            for row in rows {
                let star = if row.favorite { " *" } else { "" };
                println!(
                    "{} {}{star} ({} tasks, {}% done)",
                    row.id, row.name, row.tasks, row.progress
                );
            }
        }
        ProjectCommand::Add {
            name,
            color,
            description,
            favorite,
        } => {
            let project = store
                .add_project(NewProject {
                    name,
                    color,
                    description,
                    is_favorite: favorite,
                    ..NewProject::default()
                })
                .await?;
            if json {
                return output::json(&project);
            }
            println!("Created project {}: {}", project.id, project.name);
        }
        ProjectCommand::Delete { id } => {
            store.delete_project(&id).await?;
            if !json {
                println!("Deleted project {id}; its tasks moved to the inbox");
            }
        }
    }
    Ok(())
}

async fn run_label<B: Backend>(
    store: &mut TaskStore<B>,
    cmd: LabelCommand,
    json: bool,
) -> Result<()> {
    match cmd {
        LabelCommand::List => {
            if json {
                return output::json(store.labels());
            }
            for label in store.labels() {
                println!("{} {} {}", label.id, label.name, label.color);
            }
        }
        LabelCommand::Add {
            name,
            color,
            description,
        } => {
            let label = store
                .add_label(NewLabel {
                    name,
                    color,
                    description,
                })
                .await?;
            if json {
                return output::json(&label);
            }
            println!("Created label {}: {}", label.id, label.name);
        }
        LabelCommand::Delete { id } => {
            store.delete_label(&id).await?;
            if !json {
                println!("Deleted label {id}");
            }
        }
    }
    Ok(())
}
