//! # In-Memory Dataset Cache
//!
//! Holds the latest successfully fetched value of each dataset together with
//! the time it was fetched. The two always travel as one [`Snapshot`]: a slot
//! is swapped whole, so a reader can never see a new series paired with an
//! old fetch time or the reverse.
//!
//! ## Concurrency
//! - One writer (the refresher) calls [`CacheStore::set`]
//! - Any number of readers call [`CacheStore::get`] and friends
//! - Each slot is an `RwLock` around a cheap-to-clone snapshot; the write lock
//!   is only held for the pointer swap, never across network I/O
//! - Readers get owned `Arc`s to immutable series, never a handle into the store

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::{Dataset, TemperatureReading, TideEvent, TimeSeries};

/// A successfully fetched value, tagged with the dataset it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub enum DatasetValue {
    Tides(Arc<TimeSeries<TideEvent>>),
    LiveTemps(Arc<TimeSeries<TemperatureReading>>),
    HistoricTemps(Arc<TimeSeries<TemperatureReading>>),
}

impl DatasetValue {
    pub fn dataset(&self) -> Dataset {
        match self {
            DatasetValue::Tides(_) => Dataset::Tides,
            DatasetValue::LiveTemps(_) => Dataset::LiveTemps,
            DatasetValue::HistoricTemps(_) => Dataset::HistoricTemps,
        }
    }

    /// Timestamp of the newest record in the value.
    pub fn latest_time(&self) -> NaiveDateTime {
        match self {
            DatasetValue::Tides(series) => series.latest_time(),
            DatasetValue::LiveTemps(series) | DatasetValue::HistoricTemps(series) => {
                series.latest_time()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DatasetValue::Tides(series) => series.len(),
            DatasetValue::LiveTemps(series) | DatasetValue::HistoricTemps(series) => series.len(),
        }
    }

    /// Always false: a stored series is never empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A value and the time it was fetched, written together by one `set`.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub value: DatasetValue,
    pub fetched_at: DateTime<Utc>,
}

/// Latest value of each dataset.
#[derive(Debug, Default)]
pub struct CacheStore {
    slots: [RwLock<Option<Snapshot>>; 3],
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of a dataset's value and fetch time.
    ///
    /// Returns `None` until the first successful fetch.
    pub fn get(&self, dataset: Dataset) -> Option<Snapshot> {
        // A poisoned lock still holds a complete snapshot since the writer
        // only ever assigns whole values.
        let guard = self.slots[dataset.index()]
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Replace a dataset's value and fetch time as one unit.
    ///
    /// Fetch times are kept monotonic: if `fetched_at` is older than the
    /// stored one (clock stepped backwards) the stored time is kept.
    ///
    /// In that case the new value is paired with the previous fetch time.
    /// Readers therefore never see a fetch age grow after a refresh, at the
    /// cost of the stored time naming the earlier fetch cycle until the
    /// clock catches up.
    pub(crate) fn set(&self, value: DatasetValue, fetched_at: DateTime<Utc>) {
        let dataset = value.dataset();
        let mut guard = self.slots[dataset.index()]
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let fetched_at = match guard.as_ref() {
            Some(previous) if previous.fetched_at > fetched_at => previous.fetched_at,
            _ => fetched_at,
        };
        debug!(dataset = %dataset, records = value.len(), %fetched_at, "Cache slot replaced");
        *guard = Some(Snapshot { value, fetched_at });
    }

    /// Time of the last successful fetch of `dataset`.
    pub fn fetch_timestamp(&self, dataset: Dataset) -> Option<DateTime<Utc>> {
        self.get(dataset).map(|snapshot| snapshot.fetched_at)
    }

    /// Timestamp of the newest record held for `dataset`.
    pub fn latest_value_timestamp(&self, dataset: Dataset) -> Option<NaiveDateTime> {
        self.get(dataset).map(|snapshot| snapshot.value.latest_time())
    }

    pub fn tides(&self) -> Option<Arc<TimeSeries<TideEvent>>> {
        match self.get(Dataset::Tides)?.value {
            DatasetValue::Tides(series) => Some(series),
            _ => None,
        }
    }

    pub fn live_temps(&self) -> Option<Arc<TimeSeries<TemperatureReading>>> {
        match self.get(Dataset::LiveTemps)?.value {
            DatasetValue::LiveTemps(series) => Some(series),
            _ => None,
        }
    }

    pub fn historic_temps(&self) -> Option<Arc<TimeSeries<TemperatureReading>>> {
        match self.get(Dataset::HistoricTemps)?.value {
            DatasetValue::HistoricTemps(series) => Some(series),
            _ => None,
        }
    }
}
