use chrono::{Duration, Local};
use color_eyre::Result;
use flow_core::{
    backend::Backend,
    events::{Event, NewEvent},
};
use flow_state::TaskStore;
use serde::Serialize;

use crate::{
    cli::{EventArgs, EventCommand},
    config::Config,
    output, storage,
};

#[derive(Serialize)]
struct EventView<'a> {
    #[serde(flatten)]
    event: &'a Event,
    attendees: usize,
    registered: bool,
}

pub async fn handle(cmd: EventCommand, config: &Config, json: bool) -> Result<()> {
    let mut store = storage::open(config).await?;
    run(&mut store, cmd, json).await
}

async fn run<B: Backend>(store: &mut TaskStore<B>, cmd: EventCommand, json: bool) -> Result<()> {
    match cmd {
        EventCommand::List => {
            let events = store.events().await?;
            if json {
                return output::json(&events);
            }
            if events.is_empty() {
                println!("No events yet. Create one with `flow event add`.");
            }
            for event in &events {
                print_event(event);
            }
        }
        EventCommand::Add(args) => {
            let event = store.add_event(new_event_from_args(args)).await?;
            if json {
                return output::json(&event);
            }
            println!("Created event {}: {}", event.id, event.title);
        }
        EventCommand::Show { id } => {
            let event = store.event(&id).await?;
            let guests = store.event_guests(&id).await?;
            let view = EventView {
                event: &event,
                attendees: guests.len(),
                registered: guests.iter().any(|g| g.user_id == store.user_id()),
            };
            if json {
                return output::json(&view);
            }
            print_event(&event);
            if let Some(description) = &event.description {
                println!("    {description}");
            }
            if let Some(url) = &event.meeting_url {
                println!("    join: {url}");
            }
            let spots = match event.max_attendees {
                Some(limit) => format!("{}/{limit}", view.attendees),
                None => view.attendees.to_string(),
            };
            println!("    attendees: {spots}");
            if view.registered {
                println!("    you are registered");
            }
        }
        EventCommand::Register { id } => {
            let guest = store.register_for_event(&id).await?;
            if json {
                return output::json(&guest);
            }
            println!("Registered for event {id}");
        }
        EventCommand::Unregister { id } => {
            store.cancel_registration(&id).await?;
            if !json {
                println!("Registration for event {id} withdrawn");
            }
        }
        EventCommand::Cancel { id } => {
            let event = store.cancel_event(&id).await?;
            if json {
                return output::json(&event);
            }
            println!("Cancelled event {}: {}", event.id, event.title);
        }
    }
    Ok(())
}

fn new_event_from_args(args: EventArgs) -> NewEvent {
    let end = args.start + Duration::minutes(i64::from(args.minutes));
    NewEvent {
        description: args.description,
        location: args.location,
        meeting_url: args.url,
        visibility: args.visibility,
        max_attendees: args.max_attendees,
        ..NewEvent::new(args.title, args.start, end)
    }
}

fn print_event(event: &Event) {
    let place = event.location.as_deref().unwrap_or("online");
    println!(
        "{} {} {} [{}] ({}, {place})",
        event.id,
        event.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        event.title,
        event.status,
        event.visibility,
    );
}
