mod app;

use anyhow::Result;
use clap::{Parser, Subcommand};

use app::App;
use sunshine_core::{AppError, Config};
use sunshine_weather::{format_temperature, SyncOutcome};

#[derive(Parser)]
#[command(name = "sunshine")]
#[command(author, version, about = "Daily weather forecast with a once-a-day notification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the forecast fresh until interrupted
    Run,
    /// Fetch the forecast once and report the outcome
    Sync,
    /// Change the forecast location
    Location {
        /// Place name, e.g. "Paris" or "Portland, OR, US"
        name: String,
    },
    /// Show cached days from today onward
    Forecast,
    /// Show the config file location and validation report
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    sunshine_core::init()?;

    match cli.command {
        Commands::Run => {
            let mut app = App::new()?;
            if let Some(initial) = app.startup()? {
                tokio::spawn(async move {
                    match initial.await {
                        Ok(outcome) => tracing::info!("Initial sync: {}", outcome),
                        Err(e) => tracing::error!("Initial sync task failed: {}", e),
                    }
                });
            }
            tracing::info!(
                "Sunshine started for {}",
                app.config()
                    .weather
                    .location_name
                    .as_deref()
                    .unwrap_or("the default location")
            );
            app.run().await?;
        }
        Commands::Sync => {
            let app = App::new()?;
            let outcome = app.sync_now().await;
            println!("{}", outcome);
            if let SyncOutcome::Failed(reason) = outcome {
                let err = AppError::Sync(reason.to_string());
                tracing::warn!("{}", err);
                eprintln!("{}", err.user_message());
                std::process::exit(1);
            }
        }
        Commands::Location { name } => {
            let mut app = App::new()?;
            match app.change_location(&name).await {
                Ok(Some(sync)) => {
                    println!("Location set to {}", name.trim());
                    match sync.await {
                        Ok(outcome) => println!("{}", outcome),
                        Err(e) => tracing::error!("Sync task failed: {}", e),
                    }
                }
                Ok(None) => println!("Location unchanged"),
                Err(e) => {
                    tracing::warn!("Location change failed: {}", e);
                    eprintln!("{}", e.user_message());
                    std::process::exit(1);
                }
            }
        }
        Commands::Forecast => {
            let app = App::new()?;
            let units = app.units();
            let days = app.upcoming()?;
            if days.is_empty() {
                println!("No forecast cached. Run `sunshine sync` first.");
            }
            for day in days {
                println!(
                    "{}  {:<22} High: {:>5}  Low: {:>5}  Humidity: {}%",
                    day.date.format("%a %Y-%m-%d"),
                    day.condition().description(),
                    format_temperature(day.max_temp, units),
                    format_temperature(day.min_temp, units),
                    day.humidity,
                );
            }
        }
        Commands::Config => {
            let path = Config::config_path()?;
            let config = Config::load()?;
            let validation = config.validate();

            println!("Config file: {}", path.display());
            println!("Cache:       {}", config.cache_path().display());
            let (latitude, longitude) = config.weather.coordinates();
            println!(
                "Location:    {} ({}, {})",
                config.weather.location_name.as_deref().unwrap_or("default"),
                latitude,
                longitude
            );
            for error in &validation.errors {
                println!("  error:   {}", error);
            }
            for warning in &validation.warnings {
                println!("  warning: {}", warning);
            }
            if validation.is_valid() {
                println!("Configuration is valid");
            }
        }
    }

    Ok(())
}
