//! # Process-Wide Data Service
//!
//! [`SwimData`] wires the cache, the refresher and the queries together. Build
//! one at startup, call [`SwimData::start`] once, and share it (behind an
//! `Arc`) with whatever serves requests.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::artifacts::{ArtifactGenerator, ChartArtifacts};
use crate::cache::{CacheStore, Snapshot};
use crate::config::Config;
use crate::datasets::{DataSource, FetchError};
use crate::freshness::FreshnessReport;
use crate::noaa::NoaaClient;
use crate::query::{self, CurrentReading, PrevNextTides};
use crate::renderer::SvgRenderer;
use crate::scheduler::{Clock, RefreshSettings, Refresher, SystemClock, TickReport};
use crate::Dataset;

/// Misuse of the service lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("refresh loop already started")]
    AlreadyStarted,
}

/// Cached NOAA data for one swim spot, refreshed in the background.
pub struct SwimData {
    store: Arc<CacheStore>,
    refresher: Arc<Refresher>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    started: AtomicBool,
}

impl SwimData {
    /// Production wiring: NOAA over HTTP, SVG charts on disk.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let source = Arc::new(NoaaClient::new(config)?);
        let artifacts = Arc::new(ChartArtifacts::new(
            SvgRenderer::new(&config.artifacts.output_dir),
            config.station.name.clone(),
        ));
        Ok(Self::with_parts(config, source, artifacts, Arc::new(SystemClock)))
    }

    /// Wire the service with explicit collaborators.
    pub fn with_parts(
        config: &Config,
        source: Arc<dyn DataSource>,
        artifacts: Arc<dyn ArtifactGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(CacheStore::new());
        let settings = RefreshSettings::from_config(config);
        let tz = settings.tz;
        let refresher = Refresher::new(Arc::clone(&store), source, artifacts, settings)
            .with_clock(Arc::clone(&clock));
        Self {
            store,
            refresher: Arc::new(refresher),
            clock,
            tz,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the refresh loop on the current tokio runtime.
    ///
    /// Only the first call succeeds; later calls return
    /// [`StartError::AlreadyStarted`] and spawn nothing.
    pub fn start(&self) -> Result<JoinHandle<()>, StartError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("Refresh loop start requested twice");
            return Err(StartError::AlreadyStarted);
        }
        info!("Starting data refresh task");
        Ok(tokio::spawn(Arc::clone(&self.refresher).run()))
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Run a single refresh tick now, outside the background loop.
    pub async fn refresh_once(&self) -> TickReport {
        self.refresher.tick().await
    }

    /// Current time in station-local wall-clock terms.
    pub fn local_now(&self) -> NaiveDateTime {
        self.clock.now().with_timezone(&self.tz).naive_local()
    }

    pub fn current_reading(&self) -> Option<CurrentReading> {
        query::current_reading(&self.store)
    }

    /// Tides around `now` (local station time).
    pub fn prev_next_tide(&self, now: NaiveDateTime) -> Option<PrevNextTides> {
        query::prev_next_tide(&self.store, now)
    }

    pub fn prev_next_tide_now(&self) -> Option<PrevNextTides> {
        self.prev_next_tide(self.local_now())
    }

    pub fn freshness(&self, now: DateTime<Utc>) -> FreshnessReport {
        query::freshness(&self.store, now, self.tz)
    }

    pub fn freshness_now(&self) -> FreshnessReport {
        self.freshness(self.clock.now())
    }

    /// Raw snapshot of one dataset.
    pub fn get(&self, dataset: Dataset) -> Option<Snapshot> {
        self.store.get(dataset)
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }
}
