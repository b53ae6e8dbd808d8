//! # Swim Tracker Entry Point
//!
//! Runs the NOAA data cache as a standalone process: loads configuration,
//! starts the background refresh loop and logs a freshness summary every few
//! minutes until interrupted. The web front end links the library directly;
//! this binary is for running and watching the refresh pipeline on its own.
//!
//! Flags:
//! - `--config <path>`: config file (default `swim-config.toml`)
//! - `--once`: run a single refresh tick, print the results as JSON and exit

use std::env;
use std::time::Duration;

use swim_tracker_lib::config::Config;
use swim_tracker_lib::service::SwimData;
use swim_tracker_lib::Dataset;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often the long-running mode logs dataset ages
const STATUS_INTERVAL: Duration = Duration::from_secs(300);

fn config_path(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn log_status(data: &SwimData) {
    let report = data.freshness_now();
    for dataset in Dataset::ALL {
        let entry = report.get(dataset);
        info!(
            dataset = %dataset,
            fetch_age = entry.fetch.age.as_deref().unwrap_or("never"),
            latest_value_age = entry.latest_value.age.as_deref().unwrap_or("n/a"),
            "Freshness"
        );
    }
    if let Some(reading) = data.current_reading() {
        info!(time = %reading.time, water_temp = ?reading.water_temp, "Current reading");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match config_path(&args) {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    let data = SwimData::new(&config)?;

    // Development mode: one tick, JSON to stdout
    if args.iter().any(|arg| arg == "--once") {
        let report = data.refresh_once().await;
        for (dataset, outcome) in &report.outcomes {
            info!(dataset = %dataset, outcome = ?outcome, "Tick result");
        }
        let summary = serde_json::json!({
            "freshness": data.freshness_now(),
            "current_reading": data.current_reading(),
            "tides": data.prev_next_tide_now(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let handle = data.start()?;
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;

    loop {
        tokio::select! {
            _ = status.tick() => log_status(&data),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}
