//! NOAA client against a local mock HTTP server.

use mockito::Matcher;
use std::io::Write;
use std::sync::Arc;

use super::*;
use crate::cache::CacheStore;
use crate::noaa::NoaaClient;
use crate::scheduler::{RefreshSettings, Refresher, TickOutcome};
use crate::TimeSeries;

const TIDES_CSV: &str = "Date Time, Prediction, Type\n\
    2024-07-03 06:12,0.402,L\n\
    2024-07-03 12:31,4.810,H\n\
    2024-07-03 18:40,0.215,L\n";

const AIR_CSV: &str = "Date Time, Air Temperature, X, N, R \n\
    2024-01-01 00:00,35.2,0,0,0\n\
    2024-01-01 01:00,34.9,0,0,0\n";

fn client_for(server: &mockito::ServerGuard) -> NoaaClient {
    let mut config = Config::default();
    config.api.base_url = format!("{}/datagetter", server.url());
    config.api.request_timeout_secs = 5;
    NoaaClient::new(&config).unwrap()
}

fn query(pairs: &[(&str, &str)]) -> Matcher {
    Matcher::AllOf(
        pairs
            .iter()
            .map(|(k, v)| Matcher::UrlEncoded(k.to_string(), v.to_string()))
            .collect(),
    )
}

#[tokio::test]
async fn test_tide_request_parameters_and_parse() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/datagetter")
        .match_query(query(&[
            ("product", "predictions"),
            ("datum", "MLLW"),
            ("interval", "hilo"),
            ("station", "8517741"),
            ("begin_date", "20240703"),
            ("end_date", "20240706"),
            ("time_zone", "lst_ldt"),
            ("units", "english"),
            ("format", "csv"),
        ]))
        .with_status(200)
        .with_body(TIDES_CSV)
        .create_async()
        .await;

    let client = client_for(&server);
    let begin = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 7, 6).unwrap();
    let events = client.tide_predictions(begin, end).await.unwrap();

    mock.assert_async().await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].kind, TideKind::High);
    assert_eq!(events[2].time, local(2024, 7, 3, 18, 40));
}

#[tokio::test]
async fn test_hourly_temperature_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/datagetter")
        .match_query(query(&[
            ("product", "air_temperature"),
            ("station", "8518750"),
            ("interval", "h"),
            ("begin_date", "20240101"),
            ("end_date", "20241231"),
        ]))
        .with_body(AIR_CSV)
        .create_async()
        .await;

    let client = client_for(&server);
    let samples = client
        .temperatures(
            TemperatureProduct::Air,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            Some(Interval::Hourly),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(samples, vec![
        (local(2024, 1, 1, 0, 0), Some(35.2)),
        (local(2024, 1, 1, 1, 0), Some(34.9)),
    ]);
}

#[tokio::test]
async fn test_single_row_body_is_api_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/datagetter")
        .match_query(Matcher::Any)
        .with_body("Error\nNo data was found. This product may not be offered at this station at the requested time.\n")
        .create_async()
        .await;

    let client = client_for(&server);
    let day = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    let result = client.temperatures(TemperatureProduct::Water, day, day, None).await;

    match result {
        Err(FetchError::Api(message)) => assert!(message.starts_with("No data was found")),
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_http_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/datagetter")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let client = client_for(&server);
    let day = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    let result = client.tide_predictions(day, day).await;

    assert!(matches!(result, Err(FetchError::Http(_))));
}

/// Test that a response stalling past the request timeout is cut off, and
/// that the refresher treats it like any other failed fetch.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_response_times_out() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/datagetter")
        .match_query(Matcher::Any)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(TIDES_CSV.as_bytes())
        })
        .create_async()
        .await;

    let mut config = test_config();
    config.api.base_url = format!("{}/datagetter", server.url());
    config.api.request_timeout_secs = 1;
    config.refresh.historic_start_year = 2024;
    let client = NoaaClient::new(&config).unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 7, 3).unwrap();
    match client.tide_predictions(day, day).await {
        Err(FetchError::Http(e)) => assert!(e.is_timeout(), "expected a timeout, got {e}"),
        other => panic!("expected HTTP timeout, got {other:?}"),
    }

    let store = Arc::new(CacheStore::new());
    let stale = DatasetValue::Tides(Arc::new(TimeSeries::new(CannedSource::tide_events()).unwrap()));
    store.set(stale, noon() - Duration::days(2));
    let before = store.get(Dataset::Tides);

    let refresher = Refresher::new(
        Arc::clone(&store),
        Arc::new(client),
        Arc::new(RecordingGenerator::default()),
        RefreshSettings::from_config(&config),
    );
    let report = refresher.tick_at(noon()).await;

    for dataset in Dataset::ALL {
        assert!(matches!(report.outcome(dataset), Some(TickOutcome::Failed { .. })));
    }
    assert_eq!(store.get(Dataset::Tides), before);
    assert!(store.get(Dataset::LiveTemps).is_none());
    assert!(store.get(Dataset::HistoricTemps).is_none());
}
