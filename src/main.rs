use std::path::PathBuf;

use anyhow::{Context, Result};
use cantina_lib::config::AppConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// Twisted Cantina website API and back-office
#[derive(Parser, Debug)]
#[command(name = "cantina", version, about, long_about = None)]
struct Args {
    /// Path to config.json (defaults to the data directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Replace all menu items with the bundled house menu
    SeedMenu,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("failed to load config")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => cantina_lib::serve(config).await,
        Command::SeedMenu => {
            let count = tokio::task::spawn_blocking(move || cantina_lib::seed_menu(&config))
                .await
                .context("seed task panicked")??;
            println!("Seeded {count} menu items");
            Ok(())
        }
    }
}
