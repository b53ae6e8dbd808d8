//! # Freshness Evaluation
//!
//! Pure functions deciding whether a dataset needs refetching, plus the
//! freshness report surfaced to operators.
//!
//! Two ages are tracked per dataset and they answer different questions:
//! - **fetch age**: how long since we last talked to NOAA successfully
//! - **latest value age**: how old the newest data point is, which can be
//!   large even right after a fetch if the station stopped reporting

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;

use crate::Dataset;

/// True when a dataset has never been fetched or its last fetch is older than `ttl`.
pub fn is_expired(fetch_timestamp: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match fetch_timestamp {
        None => true,
        Some(fetched) => now - fetched > ttl,
    }
}

/// Elapsed time since `timestamp`, or `None` if there is no timestamp.
pub fn age<T>(timestamp: Option<T>, now: T) -> Option<Duration>
where
    T: std::ops::Sub<T, Output = Duration>,
{
    timestamp.map(|t| now - t)
}

/// Format a duration like `2:05:09`, or `1 day, 0:00:12` past 24 hours.
///
/// Sub-second precision is truncated.
pub fn format_age(age: Duration) -> String {
    let total = age.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();

    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    match days {
        0 => format!("{sign}{hours}:{minutes:02}:{seconds:02}"),
        1 => format!("{sign}1 day, {hours}:{minutes:02}:{seconds:02}"),
        n => format!("{sign}{n} days, {hours}:{minutes:02}:{seconds:02}"),
    }
}

/// One timestamp and how old it is. All fields are `None` together.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Age<T> {
    pub time: Option<T>,
    pub age: Option<String>,
    pub age_seconds: Option<f64>,
}

impl<T> Age<T>
where
    T: Copy + std::ops::Sub<T, Output = Duration>,
{
    pub fn measure(time: Option<T>, now: T) -> Self {
        let elapsed = age(time, now);
        Age {
            time,
            age: elapsed.map(format_age),
            age_seconds: elapsed.map(|d| d.num_milliseconds() as f64 / 1000.0),
        }
    }
}

/// Freshness of one dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetFreshness {
    /// Age of the last successful fetch
    pub fetch: Age<DateTime<Utc>>,
    /// Age of the newest record, measured in station-local time
    pub latest_value: Age<NaiveDateTime>,
}

/// Freshness of all three datasets, computed on demand and never cached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FreshnessReport {
    pub tides: DatasetFreshness,
    pub live_temps: DatasetFreshness,
    pub historic_temps: DatasetFreshness,
}

impl FreshnessReport {
    pub fn get(&self, dataset: Dataset) -> &DatasetFreshness {
        match dataset {
            Dataset::Tides => &self.tides,
            Dataset::LiveTemps => &self.live_temps,
            Dataset::HistoricTemps => &self.historic_temps,
        }
    }
}
