//! # Refresh Pipeline Test Suite
//!
//! Cross-module tests driving the refresher, queries and service through
//! canned data sources, plus HTTP-level tests of the NOAA client against a
//! local mock server. Shared stubs live here.

mod noaa_http_tests;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::artifacts::{ArtifactGenerator, ArtifactRenderer, Chart, RenderError};
use crate::cache::DatasetValue;
use crate::config::Config;
use crate::datasets::{DataSource, FetchError, FetchResult, Interval, TemperatureProduct};
use crate::scheduler::Clock;
use crate::{Dataset, TideEvent, TideKind};

/// 2024-07-04 16:00 UTC, which is noon in New York
pub(crate) fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 4, 16, 0, 0).unwrap()
}

pub(crate) fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

/// Config with historic data starting the year before `noon()`
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.refresh.historic_start_year = 2023;
    config
}

/// One request made against a [`CannedSource`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Tides,
    Temps {
        product: TemperatureProduct,
        year: i32,
        hourly: bool,
    },
}

/// A data source answering from fixed data:
/// - tides: three events around noon on 2024-07-04
/// - 6-minute temps: 100 readings ending at 11:54 local
/// - hourly temps: ten days of June for the requested year
pub(crate) struct CannedSource {
    pub fail: AtomicBool,
    /// Fail only hourly requests for this year
    pub fail_year: Mutex<Option<i32>>,
    /// Extra hourly samples appended to every hourly response
    pub extra_hourly: Mutex<Vec<(NaiveDateTime, Option<f64>)>>,
    pub calls: Mutex<Vec<Call>>,
}

impl CannedSource {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            fail_year: Mutex::new(None),
            extra_hourly: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let source = Self::new();
        source.fail.store(true, Ordering::SeqCst);
        source
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tide_events() -> Vec<TideEvent> {
        vec![
            TideEvent { time: local(2024, 7, 4, 6, 12), prediction: 0.4, kind: TideKind::Low },
            TideEvent { time: local(2024, 7, 4, 12, 31), prediction: 4.8, kind: TideKind::High },
            TideEvent { time: local(2024, 7, 4, 18, 40), prediction: 0.2, kind: TideKind::Low },
        ]
    }

    fn check_failure(&self) -> FetchResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::Api("No data was found".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for CannedSource {
    async fn tide_predictions(&self, _begin: NaiveDate, _end: NaiveDate) -> FetchResult<Vec<TideEvent>> {
        self.calls.lock().unwrap().push(Call::Tides);
        self.check_failure()?;
        Ok(Self::tide_events())
    }

    async fn temperatures(
        &self,
        product: TemperatureProduct,
        begin: NaiveDate,
        _end: NaiveDate,
        interval: Option<Interval>,
    ) -> FetchResult<Vec<(NaiveDateTime, Option<f64>)>> {
        let hourly = interval == Some(Interval::Hourly);
        self.calls.lock().unwrap().push(Call::Temps {
            product,
            year: begin.year(),
            hourly,
        });
        self.check_failure()?;

        let base = match product {
            TemperatureProduct::Air => 80.0,
            TemperatureProduct::Water => 70.0,
        };
        if !hourly {
            let end = local(2024, 7, 4, 11, 54);
            return Ok((0..100)
                .rev()
                .map(|i| (end - Duration::minutes(6 * i), Some(base + i as f64 / 100.0)))
                .collect());
        }

        if *self.fail_year.lock().unwrap() == Some(begin.year()) {
            return Err(FetchError::Malformed("truncated response".to_string()));
        }
        let start = local(begin.year(), 6, 1, 0, 0);
        let mut samples: Vec<_> = (0..24 * 10)
            .map(|h| (start + Duration::hours(h), Some(base + (h % 24) as f64 / 10.0)))
            .collect();
        samples.extend(
            self.extra_hourly
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t.year() == begin.year())
                .copied(),
        );
        Ok(samples)
    }
}

/// Records every regenerate call without producing anything.
#[derive(Default)]
pub(crate) struct RecordingGenerator {
    pub calls: Mutex<Vec<(Dataset, usize)>>,
}

impl ArtifactGenerator for RecordingGenerator {
    fn regenerate(&self, value: &DatasetValue, _today: NaiveDate) -> Result<Vec<PathBuf>, RenderError> {
        self.calls.lock().unwrap().push((value.dataset(), value.len()));
        Ok(Vec::new())
    }
}

/// Keeps every chart it is asked to render.
#[derive(Default)]
pub(crate) struct RecordingRenderer {
    pub charts: Mutex<Vec<Chart>>,
}

impl ArtifactRenderer for RecordingRenderer {
    fn render(&self, chart: &Chart) -> Result<PathBuf, RenderError> {
        self.charts.lock().unwrap().push(chart.clone());
        Ok(PathBuf::from(format!("{}.svg", chart.name)))
    }
}

/// A clock tests can move.
pub(crate) struct ManualClock(pub Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}
