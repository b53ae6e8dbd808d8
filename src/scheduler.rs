//! # Background Refresh Loop
//!
//! The [`Refresher`] is the only writer to the [`CacheStore`]. Each tick walks
//! the datasets in a fixed order (`tides`, `live_temps`, `historic_temps`) and,
//! for every expired one:
//!
//! 1. fetches a new value through the [`DataSource`]
//! 2. on success, stores it with the current time, then regenerates its charts
//! 3. on failure, logs a warning and leaves the cached value alone
//!
//! Fetches run one after another, never in parallel, which caps the request
//! rate against NOAA. A failed fetch does not advance the fetch timestamp, so
//! the dataset stays expired and is retried on the next tick.
//!
//! [`Refresher::tick_at`] runs exactly one tick for a given instant; the
//! continuous loop in [`Refresher::run`] is a thin interval wrapper around it.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactGenerator;
use crate::cache::{CacheStore, DatasetValue};
use crate::config::Config;
use crate::datasets::{self, DataSource, FetchResult, KnownBadReading};
use crate::freshness::{self, format_age};
use crate::Dataset;

/// Source of "now" for the refresh loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Refresh policy, fixed at construction.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub poll_interval: std::time::Duration,
    /// TTL per dataset, indexed like [`Dataset::ALL`]
    pub ttls: [Duration; 3],
    pub historic_start_year: i32,
    pub live_window_days: i64,
    /// Station time zone; decides what "today" is
    pub tz: Tz,
    pub exclusions: Vec<KnownBadReading>,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.refresh.poll_interval(),
            ttls: Dataset::ALL.map(|d| config.refresh.ttl(d)),
            historic_start_year: config.refresh.historic_start_year,
            live_window_days: config.refresh.live_window_days,
            tz: config.station.tz(),
            exclusions: datasets::known_bad_readings(),
        }
    }

    pub fn ttl(&self, dataset: Dataset) -> Duration {
        self.ttls[dataset.index()]
    }
}

/// What happened to one dataset during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not expired, nothing fetched
    Fresh,
    /// Fetched and stored
    Refreshed { records: usize },
    /// Fetch failed; cached value kept
    Failed { reason: String },
}

/// Per-dataset outcomes of one tick, in visiting order.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcomes: Vec<(Dataset, TickOutcome)>,
}

impl TickReport {
    pub fn outcome(&self, dataset: Dataset) -> Option<&TickOutcome> {
        self.outcomes
            .iter()
            .find(|(d, _)| *d == dataset)
            .map(|(_, outcome)| outcome)
    }
}

/// Periodically refreshes expired datasets and regenerates their artifacts.
pub struct Refresher {
    store: Arc<CacheStore>,
    source: Arc<dyn DataSource>,
    artifacts: Arc<dyn ArtifactGenerator>,
    clock: Arc<dyn Clock>,
    settings: RefreshSettings,
}

impl Refresher {
    pub fn new(
        store: Arc<CacheStore>,
        source: Arc<dyn DataSource>,
        artifacts: Arc<dyn ArtifactGenerator>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            store,
            source,
            artifacts,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Replace the clock used by [`Refresher::tick`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Run forever, one tick per poll interval; the first tick runs immediately.
    ///
    /// Stop it by aborting the task that runs it.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "Refresh loop started"
        );
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One tick at the clock's current time.
    ///
    /// Each refreshed dataset is stamped with the clock reading taken when its
    /// fetch completed, so slow fetches do not overstate fetch ages.
    pub async fn tick(&self) -> TickReport {
        self.run_tick(self.clock.now(), true).await
    }

    /// One tick as if the current time were `now`.
    ///
    /// The whole tick is pinned to `now`: expiry checks and stored fetch
    /// times all use it, whatever the clock says.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        self.run_tick(now, false).await
    }

    async fn run_tick(&self, now: DateTime<Utc>, follow_clock: bool) -> TickReport {
        let today = now.with_timezone(&self.settings.tz).date_naive();
        let mut outcomes = Vec::with_capacity(Dataset::ALL.len());

        for dataset in Dataset::ALL {
            let fetched_at = self.store.fetch_timestamp(dataset);
            if !freshness::is_expired(fetched_at, self.settings.ttl(dataset), now) {
                debug!(dataset = %dataset, "Dataset still fresh");
                outcomes.push((dataset, TickOutcome::Fresh));
                continue;
            }

            info!(dataset = %dataset, "Fetching");
            let outcome = match self.fetch(dataset, today).await {
                Ok(value) => {
                    let records = value.len();
                    let completed = if follow_clock { self.clock.now() } else { now };
                    self.store.set(value.clone(), completed);
                    self.log_latest(&value, completed);
                    self.regenerate(&value, today);
                    TickOutcome::Refreshed { records }
                }
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "Fetch failed, keeping cached value");
                    TickOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push((dataset, outcome));
        }

        TickReport { outcomes }
    }

    async fn fetch(&self, dataset: Dataset, today: NaiveDate) -> FetchResult<DatasetValue> {
        let source = self.source.as_ref();
        let value = match dataset {
            Dataset::Tides => DatasetValue::Tides(Arc::new(datasets::fetch_tides(source, today).await?)),
            Dataset::LiveTemps => DatasetValue::LiveTemps(Arc::new(
                datasets::fetch_live_temps(source, today, self.settings.live_window_days).await?,
            )),
            Dataset::HistoricTemps => DatasetValue::HistoricTemps(Arc::new(
                datasets::fetch_historic_temps(
                    source,
                    today,
                    self.settings.historic_start_year,
                    &self.settings.exclusions,
                )
                .await?,
            )),
        };
        Ok(value)
    }

    fn log_latest(&self, value: &DatasetValue, now: DateTime<Utc>) {
        let local_now = now.with_timezone(&self.settings.tz).naive_local();
        let latest = value.latest_time();
        info!(
            dataset = %value.dataset(),
            records = value.len(),
            latest = %latest,
            latest_age = %format_age(local_now - latest),
            "Fetched"
        );
    }

    fn regenerate(&self, value: &DatasetValue, today: NaiveDate) {
        match self.artifacts.regenerate(value, today) {
            Ok(paths) if !paths.is_empty() => {
                info!(dataset = %value.dataset(), artifacts = paths.len(), "Artifacts regenerated");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(dataset = %value.dataset(), error = %e, "Artifact generation failed");
            }
        }
    }
}
