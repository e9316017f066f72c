//! Integration tests for the SQLite metric store.

mod helpers;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use helpers::test_endpoint;
use vigil::probe::ProbeResult;
use vigil::storage::{MetricStore, SqliteStore};

fn sample_result(endpoint_id: &str, minute: u32) -> ProbeResult {
    let mut result = ProbeResult::new(&test_endpoint(endpoint_id, "https://example.com/health"));
    result.timestamp = Utc.with_ymd_and_hms(2026, 8, 1, 12, minute, 0).unwrap();
    result.status_code = 200;
    result.duration = Duration::from_millis(120);
    result.dns_duration = Duration::from_millis(8);
    result.connect_duration = Duration::from_millis(15);
    result.tls_duration = Duration::from_millis(40);
    result.ttfb = Duration::from_millis(110);
    result.bytes_received = 512;
    result.success = true;
    result.cert_issuer = "CN=Test CA".to_string();
    result.cert_subject = "CN=example.com".to_string();
    result.cert_not_before = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    result.cert_not_after = Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    result.cert_expiry = result.cert_not_after;
    result
}

#[tokio::test]
async fn results_round_trip_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    let written = sample_result("e1", 0);
    store.write_result(&written).await.unwrap();

    let from = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap();
    let rows = store.query_history("e1", from, to).await.unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.timestamp, written.timestamp);
    assert_eq!(row.endpoint_id, "e1");
    assert_eq!(row.status_code, 200);
    assert_eq!(row.duration, Duration::from_millis(120));
    assert_eq!(row.dns_duration, Duration::from_millis(8));
    assert_eq!(row.tls_duration, Duration::from_millis(40));
    assert_eq!(row.bytes_received, 512);
    assert!(row.success);
    assert!(row.error.is_empty());
    assert_eq!(row.cert_issuer, "CN=Test CA");
    assert_eq!(row.cert_not_after, written.cert_not_after);

    store.close().await;
}

#[tokio::test]
async fn history_is_windowed_and_time_ascending() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    // Insert out of order across two endpoints.
    for minute in [30u32, 10, 50] {
        store.write_result(&sample_result("e1", minute)).await.unwrap();
    }
    store.write_result(&sample_result("other", 20)).await.unwrap();

    let from = Utc.with_ymd_and_hms(2026, 8, 1, 12, 5, 0).unwrap();
    let to = Utc.with_ymd_and_hms(2026, 8, 1, 12, 40, 0).unwrap();
    let rows = store.query_history("e1", from, to).await.unwrap();

    let minutes: Vec<u32> = rows
        .iter()
        .map(|r| {
            use chrono::Timelike;
            r.timestamp.minute()
        })
        .collect();
    assert_eq!(minutes, vec![10, 30], "windowed, ascending, single endpoint");

    store.close().await;
}

#[tokio::test]
async fn failed_result_round_trips_error_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("checks.db")).await.unwrap();

    let mut failed = sample_result("e1", 0);
    failed.success = false;
    failed.error = "status code validation failed".to_string();
    failed.status_code = 503;
    failed.cert_issuer.clear();
    failed.cert_subject.clear();
    failed.cert_not_before = None;
    failed.cert_not_after = None;
    failed.cert_expiry = None;
    store.write_result(&failed).await.unwrap();

    let rows = store
        .query_history(
            "e1",
            Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].success);
    assert_eq!(rows[0].error, "status code validation failed");
    assert!(rows[0].cert_not_after.is_none());

    store.close().await;
}
