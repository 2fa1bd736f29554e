use chrono::Local;
use color_eyre::Result;
use flow_query::{stats::upcoming, Dashboard, Stats};

use crate::{config::Config, output, storage};

const UPCOMING_LIMIT: usize = 5;

pub async fn handle(config: &Config, full: bool, json: bool) -> Result<()> {
    let store = storage::open(config).await?;
    let now = Local::now();
    if full {
        let dashboard = store.dashboard(&now);
        if json {
            return output::json(&dashboard);
        }
        print_stats(&dashboard.stats);
        print_dashboard(&dashboard);
    } else {
        let stats = store.stats(&now);
        if json {
            return output::json(&stats);
        }
        print_stats(&stats);
    }

    let next = upcoming(store.tasks(), UPCOMING_LIMIT);
    if !json && !next.is_empty() {
        println!("Upcoming:");
        for task in next {
            if let Some(due) = task.due_date {
                println!("  {} {}", due.with_timezone(&Local).format("%Y-%m-%d"), task.title);
            }
        }
    }
    Ok(())
}

fn print_stats(stats: &Stats) {
    println!("Tasks:      {}", stats.total);
    println!("Completed:  {} ({}%)", stats.completed, stats.completion_rate);
    println!("Overdue:    {}", stats.overdue);
    println!("Due today:  {}", stats.due_today);
}

fn print_dashboard(dashboard: &Dashboard) {
    println!("Tomorrow:   {}", dashboard.due_tomorrow);
    println!("This week:  {}", dashboard.due_this_week);
    println!("In progress: {}", dashboard.in_progress);
    println!("Blocked:    {}", dashboard.blocked);
    let by_priority: Vec<String> = dashboard
        .by_priority
        .iter()
        .map(|(priority, count)| format!("{priority} {count}"))
        .collect();
    println!("Open by priority: {}", by_priority.join(", "));
    if let Some(hours) = dashboard.average_completion_hours {
        println!("Average time to done: {hours:.1}h");
    }
}
