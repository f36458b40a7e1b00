mod api;
mod config;
mod error;
mod events;
mod robot;
mod store;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use events::EventHub;
use robot::RobotClient;
use std::{net::SocketAddr, path::PathBuf};
use store::Store;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "robohub-control-plane", about = "Robot fleet task queue and dashboard API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        /// TOML config; defaults to the user config dir when present.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        port: Option<u16>,
        /// SQLite file, or `:memory:` to keep everything in memory.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Serve { config, port, db_path } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(db_path) = db_path {
                config.server.db_path = db_path;
            }
            serve(config).await?
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let store = Store::open(&config.server.db_path)
        .with_context(|| format!("failed to open {}", config.server.db_path.display()))?;
    let robots = RobotClient::new(&config.robot_defaults, config.robots.clone())
        .context("failed to build robot http client")?;
    let state = api::AppState::new(store, robots, EventHub::new(config.server.event_capacity));
    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("control-plane listening on http://{}", addr);
    info!("sqlite database at {}", config.server.db_path.display());
    for (serial_number, robot) in &config.robots {
        info!(%serial_number, base_url = %robot.base_url, "robot configured");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
