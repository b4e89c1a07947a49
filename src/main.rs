use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall_core::{config::Config, migration, server, telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "rollcall-core")]
#[command(about = "Invitations, confirmation links and registration for Rollcall realms")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server and the reminder worker
    Serve,
    /// Create the database if needed and apply migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let prometheus_handle = telemetry::init(&config.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("Starting Rollcall Core");
            info!("HTTP server listening on {}", config.http_addr());
            server::run(config, prometheus_handle).await
        }
        Command::Migrate => migration::run_migrations(&config).await,
    }
}
