//! # Read-Side Queries
//!
//! What the web layer asks the cache. Every query works on a snapshot taken
//! at call time and returns owned data. Before the first successful fetch of
//! the underlying dataset the answer is `None`: "not yet available" is an
//! ordinary outcome, not an error.

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::cache::CacheStore;
use crate::freshness::{Age, DatasetFreshness, FreshnessReport};
use crate::{Dataset, TideEvent};

/// Newest live water temperature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CurrentReading {
    pub time: NaiveDateTime,
    /// Missing if the station reported air temperature only
    pub water_temp: Option<f64>,
}

/// The tide just before now and the next two after it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrevNextTides {
    /// At most one event at or before the query time
    pub past: Vec<TideEvent>,
    /// At most two events strictly after the query time
    pub next: Vec<TideEvent>,
}

/// Last record of the live temperature series.
pub fn current_reading(store: &CacheStore) -> Option<CurrentReading> {
    let live = store.live_temps()?;
    let last = live.last();
    Some(CurrentReading {
        time: last.time,
        water_temp: last.water_temp,
    })
}

/// Most recent tide at or before `now` and the next two strictly after it.
///
/// `now` is local station time, the same clock the tide table uses.
pub fn prev_next_tide(store: &CacheStore, now: NaiveDateTime) -> Option<PrevNextTides> {
    let tides = store.tides()?;
    let split = tides.partition_point(now);
    let (before, after) = tides.records().split_at(split);

    Some(PrevNextTides {
        past: before.last().copied().into_iter().collect(),
        next: after.iter().take(2).copied().collect(),
    })
}

/// Fetch and data ages of every dataset at `now`.
pub fn freshness(store: &CacheStore, now: DateTime<Utc>, tz: Tz) -> FreshnessReport {
    let local_now = now.with_timezone(&tz).naive_local();
    let measure = |dataset: Dataset| {
        // Single snapshot so both ages describe the same fetch
        let snapshot = store.get(dataset);
        DatasetFreshness {
            fetch: Age::measure(snapshot.as_ref().map(|s| s.fetched_at), now),
            latest_value: Age::measure(snapshot.as_ref().map(|s| s.value.latest_time()), local_now),
        }
    };

    FreshnessReport {
        tides: measure(Dataset::Tides),
        live_temps: measure(Dataset::LiveTemps),
        historic_temps: measure(Dataset::HistoricTemps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DatasetValue;
    use crate::{TemperatureReading, TideKind, TimeSeries};
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::sync::Arc;

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 4).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn tide(h: u32, kind: TideKind) -> TideEvent {
        TideEvent {
            time: local(h, 0),
            prediction: if kind == TideKind::High { 4.5 } else { 0.3 },
            kind,
        }
    }

    fn store_with_tides(events: Vec<TideEvent>) -> CacheStore {
        let store = CacheStore::new();
        let fetched = Utc.with_ymd_and_hms(2024, 7, 4, 4, 0, 0).unwrap();
        store.set(DatasetValue::Tides(Arc::new(TimeSeries::new(events).unwrap())), fetched);
        store
    }

    #[test]
    fn test_no_data_is_none() {
        let store = CacheStore::new();
        assert_eq!(current_reading(&store), None);
        assert_eq!(prev_next_tide(&store, local(12, 0)), None);
    }

    #[test]
    fn test_prev_next_partition() {
        let events = vec![
            tide(2, TideKind::Low),
            tide(8, TideKind::High),
            tide(14, TideKind::Low),
            tide(20, TideKind::High),
        ];
        let store = store_with_tides(events.clone());

        // Strictly between every adjacent pair
        for i in 0..events.len() - 1 {
            let q = events[i].time + Duration::minutes(30);
            let result = prev_next_tide(&store, q).unwrap();
            assert_eq!(result.past, vec![events[i]]);
            let expected: Vec<_> = events[i + 1..].iter().take(2).copied().collect();
            assert_eq!(result.next, expected);
        }
    }

    #[test]
    fn test_prev_next_edges() {
        let events = vec![tide(2, TideKind::Low), tide(8, TideKind::High), tide(14, TideKind::Low)];
        let store = store_with_tides(events.clone());

        let before_all = prev_next_tide(&store, local(0, 0)).unwrap();
        assert!(before_all.past.is_empty());
        assert_eq!(before_all.next, vec![events[0], events[1]]);

        // An event exactly at the query time counts as past
        let exact = prev_next_tide(&store, local(8, 0)).unwrap();
        assert_eq!(exact.past, vec![events[1]]);
        assert_eq!(exact.next, vec![events[2]]);

        let after_all = prev_next_tide(&store, local(23, 0)).unwrap();
        assert_eq!(after_all.past, vec![events[2]]);
        assert!(after_all.next.is_empty());
    }

    #[test]
    fn test_current_reading_is_last_record() {
        let store = CacheStore::new();
        let readings = vec![
            TemperatureReading { time: local(10, 0), water_temp: Some(70.1), air_temp: Some(80.0) },
            TemperatureReading { time: local(10, 6), water_temp: Some(70.4), air_temp: None },
        ];
        let fetched = Utc.with_ymd_and_hms(2024, 7, 4, 14, 10, 0).unwrap();
        store.set(DatasetValue::LiveTemps(Arc::new(TimeSeries::new(readings).unwrap())), fetched);

        let reading = current_reading(&store).unwrap();
        assert_eq!(reading.time, local(10, 6));
        assert_eq!(reading.water_temp, Some(70.4));
    }

    #[test]
    fn test_freshness_uses_local_time_for_data_age() {
        let store = store_with_tides(vec![tide(2, TideKind::Low)]);
        // 12:00 UTC is 08:00 EDT
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap();

        let report = freshness(&store, now, chrono_tz::America::New_York);
        assert_eq!(report.tides.fetch.age_seconds, Some(8.0 * 3600.0));
        assert_eq!(report.tides.latest_value.age.as_deref(), Some("6:00:00"));
        assert_eq!(report.live_temps.fetch.time, None);
        assert_eq!(report.historic_temps.latest_value.age_seconds, None);
    }

    #[test]
    fn test_freshness_is_idempotent() {
        let store = store_with_tides(vec![tide(2, TideKind::Low), tide(8, TideKind::High)]);
        let now = Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap();
        let first = freshness(&store, now, chrono_tz::UTC);
        let second = freshness(&store, now, chrono_tz::UTC);
        assert_eq!(first, second);
    }
}
