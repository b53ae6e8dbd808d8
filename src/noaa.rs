//! # NOAA Tides & Currents Client
//!
//! HTTP adapter implementing [`DataSource`] against the NOAA CO-OPS data API
//! (<https://api.tidesandcurrents.noaa.gov/api/prod/>).
//!
//! ## Request Shape
//! Every request is a GET on the `datagetter` endpoint with:
//! - `time_zone=lst_ldt`: timestamps come back in local station time
//! - `units=english`: feet and °F
//! - `format=csv`: a header row followed by one row per sample
//!
//! ## Error Handling
//! - Transport failures, timeouts and non-2xx statuses → [`FetchError::Http`]
//! - A body with a single data row is how the API reports errors in CSV mode
//!   (e.g. "No data was found"), surfaced as [`FetchError::Api`]
//! - Missing columns or unparseable values → [`FetchError::Malformed`]
//!
//! Every request is bounded by the configured timeout so one hung call cannot
//! stall the refresh loop.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::datasets::{DataSource, FetchError, FetchResult, Interval, TemperatureProduct};
use crate::{TideEvent, TideKind};

/// Timestamp format of the `Date Time` column
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Client for one pair of NOAA stations.
#[derive(Debug, Clone)]
pub struct NoaaClient {
    http: reqwest::Client,
    base_url: String,
    application: String,
    tide_station: String,
    temperature_station: String,
}

impl NoaaClient {
    /// Build a client with the configured stations and request timeout.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api.base_url.clone(),
            application: config.api.application.clone(),
            tide_station: config.station.tide_id.clone(),
            temperature_station: config.station.temperature_id.clone(),
        })
    }

    async fn request(&self, params: Vec<(&'static str, String)>) -> FetchResult<CsvTable> {
        let mut query = vec![
            ("application", self.application.clone()),
            ("time_zone", "lst_ldt".to_string()),
            ("units", "english".to_string()),
            ("format", "csv".to_string()),
        ];
        query.extend(params);

        let product = query
            .iter()
            .find(|(k, _)| *k == "product")
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        info!(product, url = %self.base_url, "NOAA API request");

        let body = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        CsvTable::parse(&body)
    }
}

#[async_trait]
impl DataSource for NoaaClient {
    async fn tide_predictions(&self, begin: NaiveDate, end: NaiveDate) -> FetchResult<Vec<TideEvent>> {
        let table = self
            .request(vec![
                ("product", "predictions".to_string()),
                ("datum", "MLLW".to_string()),
                ("begin_date", format_date(begin)),
                ("end_date", format_date(end)),
                ("station", self.tide_station.clone()),
                ("interval", interval_param(Interval::HighLow).to_string()),
            ])
            .await?;
        parse_tides(&table)
    }

    async fn temperatures(
        &self,
        product: TemperatureProduct,
        begin: NaiveDate,
        end: NaiveDate,
        interval: Option<Interval>,
    ) -> FetchResult<Vec<(NaiveDateTime, Option<f64>)>> {
        let mut params = vec![
            ("product", product_param(product).to_string()),
            ("begin_date", format_date(begin)),
            ("end_date", format_date(end)),
            ("station", self.temperature_station.clone()),
        ];
        if let Some(interval) = interval {
            params.push(("interval", interval_param(interval).to_string()));
        }
        let table = self.request(params).await?;
        parse_temperatures(&table, product)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn product_param(product: TemperatureProduct) -> &'static str {
    match product {
        TemperatureProduct::Air => "air_temperature",
        TemperatureProduct::Water => "water_temperature",
    }
}

fn interval_param(interval: Interval) -> &'static str {
    match interval {
        Interval::Hourly => "h",
        Interval::HighLow => "hilo",
    }
}

fn column_name(product: TemperatureProduct) -> &'static str {
    match product {
        TemperatureProduct::Air => "Air Temperature",
        TemperatureProduct::Water => "Water Temperature",
    }
}

/// A parsed CSV body: trimmed header names and raw cell text.
#[derive(Debug, Clone)]
pub struct CsvTable {
    header: Vec<String>,
    rows: Vec<StringRecord>,
}

impl CsvTable {
    /// Split a CSV body into header and rows, detecting in-band API errors.
    pub fn parse(body: &str) -> FetchResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b',')
            .trim(csv::Trim::All)
            // Error bodies do not follow the header's column count
            .flexible(true)
            .from_reader(body.as_bytes());

        let header: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::to_string)
            .collect();
        if header.iter().all(String::is_empty) {
            return Err(FetchError::Malformed("empty response body".to_string()));
        }
        let rows = reader
            .records()
            .filter(|record| !matches!(record, Ok(r) if r.iter().all(str::is_empty)))
            .collect::<Result<Vec<StringRecord>, csv::Error>>()
            .map_err(malformed)?;

        // A lone row is an error message, not a sample
        if rows.len() == 1 {
            return Err(FetchError::Api(rows[0].iter().collect::<Vec<_>>().join(",")));
        }
        if header.first().map(String::as_str) != Some("Date Time") {
            return Err(FetchError::Api(header.join(",")));
        }

        Ok(Self { header, rows })
    }

    fn column(&self, name: &str) -> FetchResult<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| FetchError::Malformed(format!("missing column '{name}'")))
    }

    fn cell<'a>(&self, row: &'a StringRecord, index: usize) -> FetchResult<&'a str> {
        row.get(index).ok_or_else(|| {
            let text = row.iter().collect::<Vec<_>>().join(",");
            FetchError::Malformed(format!("short row: {text}"))
        })
    }
}

fn malformed(e: csv::Error) -> FetchError {
    FetchError::Malformed(format!("CSV: {e}"))
}

fn parse_time(text: &str) -> FetchResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIME_FORMAT)
        .map_err(|e| FetchError::Malformed(format!("bad timestamp '{text}': {e}")))
}

fn parse_value(text: &str) -> FetchResult<Option<f64>> {
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| FetchError::Malformed(format!("bad value '{text}'")))
}

/// Rows of a `predictions` response with `interval=hilo`.
pub fn parse_tides(table: &CsvTable) -> FetchResult<Vec<TideEvent>> {
    let time_col = table.column("Date Time")?;
    let height_col = table.column("Prediction")?;
    let type_col = table.column("Type")?;

    table
        .rows
        .iter()
        .map(|row| -> FetchResult<TideEvent> {
            let time = parse_time(table.cell(row, time_col)?)?;
            let prediction = parse_value(table.cell(row, height_col)?)?
                .ok_or_else(|| FetchError::Malformed(format!("missing prediction at {time}")))?;
            let kind = match table.cell(row, type_col)? {
                "L" => TideKind::Low,
                "H" => TideKind::High,
                other => return Err(FetchError::Malformed(format!("unknown tide type '{other}'"))),
            };
            Ok(TideEvent { time, prediction, kind })
        })
        .collect()
}

/// Rows of an `air_temperature` or `water_temperature` response.
///
/// The trailing flag columns (`X`, `N`, `R`) are ignored.
pub fn parse_temperatures(
    table: &CsvTable,
    product: TemperatureProduct,
) -> FetchResult<Vec<(NaiveDateTime, Option<f64>)>> {
    let time_col = table.column("Date Time")?;
    let value_col = table.column(column_name(product))?;

    table
        .rows
        .iter()
        .map(|row| -> FetchResult<(NaiveDateTime, Option<f64>)> {
            let time = parse_time(table.cell(row, time_col)?)?;
            let value = parse_value(table.cell(row, value_col)?)?;
            Ok((time, value))
        })
        .collect()
}
