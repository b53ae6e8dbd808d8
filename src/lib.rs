//! # Swim Tracker Core Library
//!
//! This library keeps an in-memory, self-refreshing cache of three NOAA datasets
//! for a single swimming spot and regenerates charts whenever new data lands.
//!
//! ## Datasets
//!
//! | Dataset          | Source product                          | TTL    |
//! |------------------|-----------------------------------------|--------|
//! | `tides`          | `predictions` (high/low, MLLW)          | 24 h   |
//! | `live_temps`     | `air_temperature` + `water_temperature` | 10 min |
//! | `historic_temps` | hourly temperatures since 2011          | 3 h    |
//!
//! ## Data Flow
//! 1. **Tick**: the [`scheduler::Refresher`] checks each dataset's fetch age
//! 2. **Fetch**: expired datasets are fetched through a [`datasets::DataSource`]
//! 3. **Store**: the new series replaces the old one in the [`cache::CacheStore`]
//! 4. **Regenerate**: charts derived from the dataset are re-rendered
//! 5. **Query**: readers get copy-out snapshots through [`query`] and [`service::SwimData`]
//!
//! A failed fetch never clears data: stale-but-present always beats absent.
//!
//! ## Core Types
//! - [`Dataset`]: which of the three series a value belongs to
//! - [`TideEvent`] and [`TemperatureReading`]: the records inside a series
//! - [`TimeSeries`]: a non-empty, strictly time-ordered sequence of records

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod artifacts;
pub mod cache;
pub mod config;
pub mod datasets;
pub mod freshness;
pub mod noaa;
pub mod query;
pub mod renderer;
pub mod scheduler;
pub mod service;

/// One of the three independently refreshed datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Tides,
    LiveTemps,
    HistoricTemps,
}

impl Dataset {
    /// All datasets, in the order a refresh tick visits them.
    pub const ALL: [Dataset; 3] = [Dataset::Tides, Dataset::LiveTemps, Dataset::HistoricTemps];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::Tides => "tides",
            Dataset::LiveTemps => "live_temps",
            Dataset::HistoricTemps => "historic_temps",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Dataset::Tides => 0,
            Dataset::LiveTemps => 1,
            Dataset::HistoricTemps => 2,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// High or low water.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TideKind {
    Low,
    High,
}

/// A predicted high or low tide.
///
/// Times are local station time (standard or daylight, whichever applies),
/// exactly as NOAA reports them with `time_zone=lst_ldt`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideEvent {
    pub time: NaiveDateTime,
    /// Predicted height in feet above MLLW
    pub prediction: f64,
    #[serde(rename = "type")]
    pub kind: TideKind,
}

/// Air and water temperature at one instant, in °F.
///
/// Either value may be missing: the two products are fetched separately and
/// the station does not always report both.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub time: NaiveDateTime,
    pub water_temp: Option<f64>,
    pub air_temp: Option<f64>,
}

/// Records that carry their own timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> NaiveDateTime;
}

impl Timestamped for TideEvent {
    fn timestamp(&self) -> NaiveDateTime {
        self.time
    }
}

impl Timestamped for TemperatureReading {
    fn timestamp(&self) -> NaiveDateTime {
        self.time
    }
}

/// Reasons a sequence of records cannot become a [`TimeSeries`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("series is empty")]
    Empty,

    #[error("timestamps not strictly increasing at {0}")]
    OutOfOrder(NaiveDateTime),
}

/// A non-empty sequence of records with strictly increasing timestamps.
///
/// The invariant is checked once at construction, so every holder of a
/// `TimeSeries` can rely on `first()`/`last()` existing and on binary search
/// by time being valid.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use swim_tracker_lib::{TemperatureReading, TimeSeries};
///
/// let at = |h| NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(h, 0, 0).unwrap();
/// let series = TimeSeries::new(vec![
///     TemperatureReading { time: at(1), water_temp: Some(61.2), air_temp: None },
///     TemperatureReading { time: at(2), water_temp: Some(61.5), air_temp: Some(70.0) },
/// ])
/// .unwrap();
///
/// assert_eq!(series.len(), 2);
/// assert_eq!(series.last().water_temp, Some(61.5));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeSeries<T> {
    records: Vec<T>,
}

impl<T: Timestamped> TimeSeries<T> {
    /// Wrap already-ordered records, rejecting empty or unordered input.
    pub fn new(records: Vec<T>) -> Result<Self, SeriesError> {
        if records.is_empty() {
            return Err(SeriesError::Empty);
        }
        if let Some(pair) = records
            .windows(2)
            .find(|w| w[0].timestamp() >= w[1].timestamp())
        {
            return Err(SeriesError::OutOfOrder(pair[1].timestamp()));
        }
        Ok(Self { records })
    }

    /// Sort records by time, keeping the first record seen for each timestamp.
    pub fn from_unsorted(mut records: Vec<T>) -> Result<Self, SeriesError> {
        // Stable sort keeps arrival order among equal timestamps
        records.sort_by_key(|r| r.timestamp());
        records.dedup_by_key(|r| r.timestamp());
        Self::new(records)
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> &T {
        &self.records[0]
    }

    pub fn last(&self) -> &T {
        &self.records[self.records.len() - 1]
    }

    /// Timestamp of the newest record.
    pub fn latest_time(&self) -> NaiveDateTime {
        self.last().timestamp()
    }

    /// Number of records with a timestamp at or before `time`.
    pub fn partition_point(&self, time: NaiveDateTime) -> usize {
        self.records.partition_point(|r| r.timestamp() <= time)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests;
