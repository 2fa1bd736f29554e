mod cli;
mod config;
mod events;
mod focus;
mod output;
mod projects;
mod stats;
mod storage;
mod tasks;

use clap::Parser;
use color_eyre::Result;
use flow_core::storage::KvStore;
use flow_storage::file_store::FileStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Version => print_version(),
        Command::Health => run_health_check(&config).await?,
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        Command::Task(cmd) => tasks::handle(cmd, &config, cli.json).await?,
        Command::Stats { full } => stats::handle(&config, full, cli.json).await?,
        Command::Project(cmd) => projects::handle_project(cmd, &config, cli.json).await?,
        Command::Label(cmd) => projects::handle_label(cmd, &config, cli.json).await?,
        Command::Focus(cmd) => focus::handle(cmd, &config, cli.json).await?,
        Command::Event(cmd) => events::handle(cmd, &config, cli.json).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Logs go to stderr so --json output stays clean.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("flow {}", env!("CARGO_PKG_VERSION"));
}

/// Check the data directory with a write, read and delete.
async fn run_health_check(config: &config::Config) -> Result<()> {
    let store: FileStore = storage::store_from_config(config)?;
    run_store_health(&store).await?;
    println!("Storage: ok ({})", store.root().display());
    Ok(())
}

async fn run_store_health<S: KvStore>(store: &S) -> Result<()> {
    let check_key = "health/check";
    let payload = b"ok";
    store.put(check_key, payload).await?;
    let round_trip = store.get(check_key).await?;
    store.delete(check_key).await?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}
