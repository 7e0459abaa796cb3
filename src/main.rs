mod aqi;
mod config;
mod database;
mod error;
mod fleet;
mod models;
mod notify;
mod runner;
mod sensors;
mod server;
mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};

use config::AlertConfig;
use database::open_store;
use error::CheckError;
use notify::TwilioMessenger;
use runner::Checker;
use sensors::PurpleAirClient;
use server::AppState;

#[derive(Parser)]
#[command(name = "air-alert")]
#[command(about = "Text alerts when PurpleAir sensors report a change in air quality", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the sensors once and exit
    Run,

    /// Serve GET / (persisted state) and GET /run (check now) over HTTP
    Serve,
}

fn build_checker(config: AlertConfig) -> Result<Checker, Box<dyn std::error::Error>> {
    let sensors = PurpleAirClient::new(&config)?;
    let messenger = TwilioMessenger::new(&config)?;
    let store = open_store(&config.database_url);

    Ok(Checker::new(
        config,
        Arc::new(sensors),
        store,
        Arc::new(messenger),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match AlertConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    let host = config.host.clone();
    let port = config.port;
    let checker = build_checker(config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => match checker.run().await {
            Ok(report) => {
                info!(
                    "Run complete: status {}, AQI {}",
                    report.state.status, report.state.aqi
                );
            }
            Err(CheckError::FleetResultUnavailable) => {
                info!("Run ended without a fleet reading");
            }
            Err(e) => {
                error!("Fatal error: {}", e);
                return Err(e.into());
            }
        },
        Commands::Serve => {
            server::serve(AppState::new(checker), &host, port).await?;
        }
    }

    Ok(())
}
