//! # Configuration Management
//!
//! This module loads runtime settings from `swim-config.toml`. Every field has
//! a default, so a missing or partial file still yields a working setup for
//! The Battery / Coney Island in New York.
//!
//! TTLs are read once when the service is constructed; changing the file
//! requires a restart.

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::Dataset;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "swim-config.toml";

/// Application configuration loaded from swim-config.toml
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// NOAA stations and local time zone
    pub station: StationConfig,
    /// Remote API settings
    pub api: ApiConfig,
    /// Poll interval and dataset TTLs
    pub refresh: RefreshConfig,
    /// Rendered chart output
    pub artifacts: ArtifactConfig,
}

/// NOAA station configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// Human-readable location name used in chart titles
    pub name: String,
    /// Station reporting air/water temperature (e.g. "8518750", The Battery)
    pub temperature_id: String,
    /// Station used for tide predictions (e.g. "8517741", Coney Island)
    pub tide_id: String,
    /// IANA time zone of the stations; NOAA returns local standard/daylight time
    pub time_zone: String,
}

/// NOAA data API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// datagetter endpoint
    pub base_url: String,
    /// Value of the `application` query parameter
    pub application: String,
    /// Upper bound for a single HTTP request, in seconds
    pub request_timeout_secs: u64,
}

/// Refresh loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between ticks
    pub poll_interval_secs: u64,
    pub tides_ttl_secs: i64,
    pub live_temps_ttl_secs: i64,
    pub historic_temps_ttl_secs: i64,
    /// First calendar year of the historic series
    pub historic_start_year: i32,
    /// Trailing window of live readings fetched every refresh
    pub live_window_days: i64,
}

/// Chart output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory where SVG charts are written (overwritten in place)
    pub output_dir: PathBuf,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            name: "Battery NYC".to_string(),
            temperature_id: "8518750".to_string(),
            tide_id: "8517741".to_string(),
            time_zone: "America/New_York".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.tidesandcurrents.noaa.gov/api/prod/datagetter".to_string(),
            application: "swim-tracker".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            poll_interval_secs: 60,
            // Predictions already cover a wide past/present window
            tides_ttl_secs: 24 * 60 * 60,
            // Readings land every 6 minutes, usually already ~5 minutes old
            live_temps_ttl_secs: 10 * 60,
            historic_temps_ttl_secs: 3 * 60 * 60,
            historic_start_year: 2011,
            live_window_days: 8,
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        ArtifactConfig {
            output_dir: PathBuf::from("static/plots"),
        }
    }
}

impl StationConfig {
    /// Parsed station time zone, falling back to New York on a bad name.
    pub fn tz(&self) -> Tz {
        self.time_zone.parse().unwrap_or_else(|_| {
            warn!(time_zone = %self.time_zone, "Unknown time zone, using America/New_York");
            chrono_tz::America::New_York
        })
    }
}

impl RefreshConfig {
    /// Staleness threshold for one dataset.
    pub fn ttl(&self, dataset: Dataset) -> Duration {
        let secs = match dataset {
            Dataset::Tides => self.tides_ttl_secs,
            Dataset::LiveTemps => self.live_temps_ttl_secs,
            Dataset::HistoricTemps => self.historic_temps_ttl_secs,
        };
        Duration::seconds(secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from swim-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(station = %config.station.name, path = %path.display(), "Loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Write this configuration to `path` as pretty TOML
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
