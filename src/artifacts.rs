//! # Derived Chart Artifacts
//!
//! Turns a freshly fetched dataset into chart descriptions and hands them to
//! an [`ArtifactRenderer`]. This module owns the *shape* of each chart (which
//! series, which window, how smoothed); pixels are the renderer's business.
//!
//! ## Artifacts
//!
//! | Dataset          | Artifact name                  | Content                                  |
//! |------------------|--------------------------------|------------------------------------------|
//! | `live_temps`     | `live_temps`                   | last 48 h raw + 2 h centered mean        |
//! | `historic_temps` | `historic_temps_2mo_24h_mean`  | ±30 days around today, one line per year |
//! | `historic_temps` | `historic_temps_12mo_24h_mean` | whole year, one line per year            |
//!
//! `tides` has no chart.
//!
//! ## Year Pivot
//! Historic charts overlay years on a shared axis. Every timestamp is moved
//! into 2020 (a leap year, so Feb 29 has a home) and each year becomes its own
//! column aligned on that axis.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::cache::DatasetValue;
use crate::{TemperatureReading, TimeSeries};

/// Year every historic timestamp is mapped into for the pivot
pub const ALIGN_YEAR: i32 = 2020;

/// 20 six-minute samples ≈ 2 hours
pub const LIVE_TREND_WINDOW: usize = 20;

/// 48 hours of six-minute samples
pub const LIVE_TAIL_SAMPLES: usize = 10 * 24 * 2;

/// 24 hourly samples
pub const HISTORIC_MEAN_WINDOW: usize = 24;

/// Half-width of the seasonal window around today
pub const HISTORIC_WINDOW_DAYS: i64 = 30;

/// Errors raised while producing artifacts.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("artifact IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("chart '{0}' has no plottable points")]
    NothingToPlot(String),
}

/// One line on a chart. `None` values are gaps.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartSeries {
    pub label: String,
    pub points: Vec<(NaiveDateTime, Option<f64>)>,
}

/// Everything a renderer needs to draw one artifact.
#[derive(Clone, Debug, PartialEq)]
pub struct Chart {
    /// Stable artifact name; the renderer overwrites the previous output
    pub name: String,
    pub title: String,
    pub subtitle: String,
    pub x_label: String,
    pub y_label: String,
    /// strftime pattern for x-axis tick labels
    pub x_format: String,
    pub series: Vec<ChartSeries>,
    /// Label of the series to emphasize, if any
    pub highlight: Option<String>,
}

/// Draws a [`Chart`] somewhere and reports where.
pub trait ArtifactRenderer: Send + Sync {
    fn render(&self, chart: &Chart) -> Result<PathBuf, RenderError>;
}

/// Regenerates the artifacts derived from a dataset after it is refreshed.
///
/// Called once per successful fetch, for every dataset, with the new value.
pub trait ArtifactGenerator: Send + Sync {
    fn regenerate(&self, value: &DatasetValue, today: NaiveDate) -> Result<Vec<PathBuf>, RenderError>;
}

/// Default generator: shapes charts and renders them with `R`.
#[derive(Debug, Clone)]
pub struct ChartArtifacts<R> {
    renderer: R,
    station_name: String,
}

impl<R: ArtifactRenderer> ChartArtifacts<R> {
    pub fn new(renderer: R, station_name: impl Into<String>) -> Self {
        Self {
            renderer,
            station_name: station_name.into(),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

impl<R: ArtifactRenderer> ArtifactGenerator for ChartArtifacts<R> {
    fn regenerate(&self, value: &DatasetValue, today: NaiveDate) -> Result<Vec<PathBuf>, RenderError> {
        let charts = charts_for(value, today, &self.station_name);
        let mut written = Vec::with_capacity(charts.len());
        for chart in &charts {
            info!(artifact = %chart.name, "Generating chart");
            written.push(self.renderer.render(chart)?);
        }
        Ok(written)
    }
}

/// Charts derived from a dataset value.
pub fn charts_for(value: &DatasetValue, today: NaiveDate, station_name: &str) -> Vec<Chart> {
    match value {
        DatasetValue::Tides(_) => Vec::new(),
        DatasetValue::LiveTemps(series) => vec![live_temps_chart(series, station_name)],
        DatasetValue::HistoricTemps(series) => historic_charts(series, today, station_name),
    }
}

/// Centered rolling mean over `window` samples.
///
/// Sample `i` averages `i - window/2 ..= i + window - 1 - window/2`. The result
/// is `None` where the window runs off either end or covers a gap.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = values.len();
    if window == 0 {
        return vec![None; n];
    }
    let before = window / 2;
    let after = window - 1 - before;

    (0..n)
        .map(|i| {
            if i < before || i + after >= n {
                return None;
            }
            values[i - before..=i + after]
                .iter()
                .copied()
                .sum::<Option<f64>>()
                .map(|total| total / window as f64)
        })
        .collect()
}

/// Last 48 hours of water temperature with a 2-hour trend line.
pub fn live_temps_chart(series: &TimeSeries<TemperatureReading>, station_name: &str) -> Chart {
    let times: Vec<NaiveDateTime> = series.iter().map(|r| r.time).collect();
    let raw: Vec<Option<f64>> = series.iter().map(|r| r.water_temp).collect();
    let trend = rolling_mean(&raw, LIVE_TREND_WINDOW);

    let start = times.len().saturating_sub(LIVE_TAIL_SAMPLES);
    let column = |values: &[Option<f64>]| -> Vec<(NaiveDateTime, Option<f64>)> {
        times[start..].iter().copied().zip(values[start..].iter().copied()).collect()
    };

    Chart {
        name: "live_temps".to_string(),
        title: format!("{station_name} Water Temperature"),
        subtitle: "48-hour, live".to_string(),
        x_label: "Time".to_string(),
        y_label: "Water Temp (°F)".to_string(),
        x_format: "%a %-I %p".to_string(),
        series: vec![
            ChartSeries {
                label: "live".to_string(),
                points: column(&raw),
            },
            ChartSeries {
                label: "trend (2-hr)".to_string(),
                points: column(&trend),
            },
        ],
        highlight: None,
    }
}

/// Water temperature with years as parallel columns on a 2020 time axis.
#[derive(Clone, Debug, PartialEq)]
pub struct YearPivot {
    /// Union of aligned timestamps across all years, ascending
    pub index: Vec<NaiveDateTime>,
    /// One column per year, each `index.len()` long
    pub columns: BTreeMap<i32, Vec<Option<f64>>>,
}

impl YearPivot {
    pub fn build(series: &TimeSeries<TemperatureReading>) -> Self {
        let mut by_year: BTreeMap<i32, BTreeMap<NaiveDateTime, Option<f64>>> = BTreeMap::new();
        let mut index = BTreeSet::new();

        for reading in series.iter() {
            let Some(aligned) = reading.time.with_year(ALIGN_YEAR) else {
                continue;
            };
            index.insert(aligned);
            by_year
                .entry(reading.time.year())
                .or_default()
                .insert(aligned, reading.water_temp);
        }

        let index: Vec<NaiveDateTime> = index.into_iter().collect();
        let columns = by_year
            .into_iter()
            .map(|(year, values)| {
                let column = index.iter().map(|t| values.get(t).copied().flatten()).collect();
                (year, column)
            })
            .collect();

        Self { index, columns }
    }

    /// Rows with `start <= time <= end`.
    pub fn slice(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let lo = self.index.partition_point(|t| *t < start);
        let hi = self.index.partition_point(|t| *t <= end);
        let lo = lo.min(hi);
        Self {
            index: self.index[lo..hi].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(year, values)| (*year, values[lo..hi].to_vec()))
                .collect(),
        }
    }

    /// Apply a centered rolling mean to every year column.
    pub fn smoothed(&self, window: usize) -> Self {
        Self {
            index: self.index.clone(),
            columns: self
                .columns
                .iter()
                .map(|(year, values)| (*year, rolling_mean(values, window)))
                .collect(),
        }
    }

    fn into_series(self) -> Vec<ChartSeries> {
        let index = self.index;
        self.columns
            .into_iter()
            .map(|(year, values)| ChartSeries {
                label: year.to_string(),
                points: index.iter().copied().zip(values).collect(),
            })
            .collect()
    }
}

/// Two-month and full-year multi-year charts, 24-hour smoothing.
pub fn historic_charts(
    series: &TimeSeries<TemperatureReading>,
    today: NaiveDate,
    station_name: &str,
) -> Vec<Chart> {
    let pivot = YearPivot::build(series);
    let highlight = Some(today.year().to_string());
    let title = format!("{station_name} Water Temperature");
    let mut charts = Vec::with_capacity(2);

    if let Some(anchor) = today.with_year(ALIGN_YEAR).and_then(|d| d.and_hms_opt(0, 0, 0)) {
        let window = Duration::days(HISTORIC_WINDOW_DAYS);
        let two_month = pivot
            .slice(anchor - window, anchor + window)
            .smoothed(HISTORIC_MEAN_WINDOW);
        charts.push(Chart {
            name: "historic_temps_2mo_24h_mean".to_string(),
            title: title.clone(),
            subtitle: "2 month, all years, 24-hour mean".to_string(),
            x_label: "Date".to_string(),
            y_label: "Water Temp (°F)".to_string(),
            x_format: "%b %d".to_string(),
            series: two_month.into_series(),
            highlight: highlight.clone(),
        });
    }

    charts.push(Chart {
        name: "historic_temps_12mo_24h_mean".to_string(),
        title,
        subtitle: "all years, 24-hour mean".to_string(),
        x_label: "Date".to_string(),
        y_label: "Water Temp (°F)".to_string(),
        x_format: "%b".to_string(),
        series: pivot.smoothed(HISTORIC_MEAN_WINDOW).into_series(),
        highlight,
    });

    charts
}
