//! # Dataset Fetching
//!
//! One fetch strategy per dataset, each built on top of a [`DataSource`]: the
//! seam between the refresh loop and the remote API. Production code plugs in
//! [`crate::noaa::NoaaClient`]; tests plug in canned sources.
//!
//! ## Strategies
//! - **Tides**: high/low predictions from yesterday through two days ahead
//! - **Live temps**: full re-fetch of the trailing window (8 days) of
//!   6-minute air and water readings, merged on timestamp
//! - **Historic temps**: hourly air and water readings, one request pair per
//!   calendar year since the start year. Any failed year fails the whole
//!   refresh; partial history is never cached.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::{SeriesError, TemperatureReading, TideEvent, TimeSeries};

/// Errors that end a single dataset refresh.
///
/// None of these are fatal: the refresher logs them, keeps the cached value
/// and tries again on a later tick.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (network, timeout, or non-success status)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error message instead of data
    #[error("NOAA API error: {0}")]
    Api(String),

    /// The response did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Records could not form a valid series (e.g. no data at all)
    #[error("invalid series: {0}")]
    Series(#[from] SeriesError),
}

/// Result of one fetch: a value or the reason there is none.
pub type FetchResult<T> = Result<T, FetchError>;

/// Which temperature product to request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemperatureProduct {
    Air,
    Water,
}

/// Sampling interval requested from the API.
///
/// Temperature requests without an interval return 6-minute data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interval {
    Hourly,
    HighLow,
}

/// Raw access to the remote measurements.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// High/low tide predictions between two local dates, inclusive.
    async fn tide_predictions(&self, begin: NaiveDate, end: NaiveDate) -> FetchResult<Vec<TideEvent>>;

    /// Temperature samples between two local dates, inclusive.
    async fn temperatures(
        &self,
        product: TemperatureProduct,
        begin: NaiveDate,
        end: NaiveDate,
        interval: Option<Interval>,
    ) -> FetchResult<Vec<(NaiveDateTime, Option<f64>)>>;
}

/// An instant known to hold an instrument error in the historic record.
#[derive(Clone, Copy, Debug)]
pub struct KnownBadReading {
    pub at: NaiveDateTime,
    pub reason: &'static str,
}

/// Historic readings removed before caching.
///
/// These were found by eye on the yearly charts. This is a data-quality patch
/// for specific instants, not outlier detection; replace it with a real
/// spike filter if more of them show up.
pub fn known_bad_readings() -> Vec<KnownBadReading> {
    const TABLE: [((i32, u32, u32, u32), &str); 3] = [
        ((2017, 5, 23, 11), "water temperature spike, sensor fault"),
        ((2017, 5, 23, 12), "water temperature spike, sensor fault"),
        ((2020, 5, 22, 13), "isolated water temperature spike"),
    ];
    TABLE
        .iter()
        .filter_map(|&((y, m, d, h), reason)| {
            let at = NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(h, 0, 0)?;
            Some(KnownBadReading { at, reason })
        })
        .collect()
}

/// Tide predictions from yesterday through two days from `today`.
pub async fn fetch_tides(
    source: &dyn DataSource,
    today: NaiveDate,
) -> FetchResult<TimeSeries<TideEvent>> {
    let events = source
        .tide_predictions(today - Duration::days(1), today + Duration::days(2))
        .await?;
    Ok(TimeSeries::from_unsorted(events)?)
}

/// Trailing `window_days` of 6-minute air and water readings.
pub async fn fetch_live_temps(
    source: &dyn DataSource,
    today: NaiveDate,
    window_days: i64,
) -> FetchResult<TimeSeries<TemperatureReading>> {
    let begin = today - Duration::days(window_days);
    let air = source
        .temperatures(TemperatureProduct::Air, begin, today, None)
        .await?;
    let water = source
        .temperatures(TemperatureProduct::Water, begin, today, None)
        .await?;

    let series = TimeSeries::new(merge_readings(air, water))?;
    debug!(records = series.len(), latest = %series.latest_time(), "Live temps merged");
    Ok(series)
}

/// Hourly readings for every year from `start_year` through `today`'s year.
///
/// Known-bad instants in `exclusions` are dropped, then readings are bucketed
/// to the hour keeping the first value of each field per hour.
pub async fn fetch_historic_temps(
    source: &dyn DataSource,
    today: NaiveDate,
    start_year: i32,
    exclusions: &[KnownBadReading],
) -> FetchResult<TimeSeries<TemperatureReading>> {
    let mut readings = Vec::new();
    for year in start_year..=today.year() {
        let (begin, end) = year_bounds(year)?;
        let air = source
            .temperatures(TemperatureProduct::Air, begin, end, Some(Interval::Hourly))
            .await?;
        let water = source
            .temperatures(TemperatureProduct::Water, begin, end, Some(Interval::Hourly))
            .await?;
        let merged = merge_readings(air, water);
        debug!(year, records = merged.len(), "Historic year fetched");
        readings.extend(merged);
    }

    let before = readings.len();
    readings.retain(|r| !exclusions.iter().any(|bad| bad.at == r.time));
    if readings.len() != before {
        info!(dropped = before - readings.len(), "Dropped known-bad historic readings");
    }

    Ok(TimeSeries::new(resample_hourly(readings))?)
}

fn year_bounds(year: i32) -> FetchResult<(NaiveDate, NaiveDate)> {
    let begin = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    begin
        .zip(end)
        .ok_or_else(|| FetchError::Malformed(format!("year {year} out of range")))
}

/// Outer-join air and water samples on timestamp, sorted by time.
///
/// A repeated timestamp within one product keeps its first sample.
pub fn merge_readings(
    air: Vec<(NaiveDateTime, Option<f64>)>,
    water: Vec<(NaiveDateTime, Option<f64>)>,
) -> Vec<TemperatureReading> {
    let mut merged: BTreeMap<NaiveDateTime, TemperatureReading> = BTreeMap::new();
    let blank = |time| TemperatureReading {
        time,
        water_temp: None,
        air_temp: None,
    };

    let mut seen_air = std::collections::HashSet::new();
    for (time, value) in air {
        if seen_air.insert(time) {
            merged.entry(time).or_insert_with(|| blank(time)).air_temp = value;
        }
    }
    let mut seen_water = std::collections::HashSet::new();
    for (time, value) in water {
        if seen_water.insert(time) {
            merged.entry(time).or_insert_with(|| blank(time)).water_temp = value;
        }
    }
    merged.into_values().collect()
}

/// Bucket readings to the top of the hour, keeping the first present value
/// of each field within the hour. Hours with no readings are left out.
pub fn resample_hourly(readings: Vec<TemperatureReading>) -> Vec<TemperatureReading> {
    let mut hours: BTreeMap<NaiveDateTime, TemperatureReading> = BTreeMap::new();
    let mut sorted = readings;
    sorted.sort_by_key(|r| r.time);

    for reading in sorted {
        let Some(hour) = floor_to_hour(reading.time) else {
            continue;
        };
        let slot = hours.entry(hour).or_insert(TemperatureReading {
            time: hour,
            water_temp: None,
            air_temp: None,
        });
        slot.water_temp = slot.water_temp.or(reading.water_temp);
        slot.air_temp = slot.air_temp.or(reading.air_temp);
    }
    hours.into_values().collect()
}

fn floor_to_hour(time: NaiveDateTime) -> Option<NaiveDateTime> {
    time.date().and_hms_opt(time.hour(), 0, 0)
}
