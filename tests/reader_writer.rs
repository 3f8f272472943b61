//! Writer/reader integration tests against the in-memory store.

use std::sync::Arc;

use bson::doc;
use chrono::{Duration, DurationRound, Utc};
use daylog::provision::Provisioner;
use daylog::store::{MemoryStore, RangeQuery};
use daylog::{Error, Level, LogReader, LogRecord, LogWriter, RecordMeta, ShardSchema};

fn record(secs_ago: i64, level: Level, message: &str) -> LogRecord {
    // Whole-second timestamps survive the BSON millisecond roundtrip.
    let now = Utc::now().duration_trunc(Duration::seconds(1)).unwrap();
    LogRecord {
        timestamp: now - Duration::seconds(secs_ago),
        meta: RecordMeta {
            service: "svc-a".to_string(),
            level,
            hostname: "host-1".to_string(),
            pid: 100,
        },
        message: message.to_string(),
        details: doc! {},
    }
}

async fn setup() -> (Arc<MemoryStore>, LogWriter, LogReader) {
    let store = Arc::new(MemoryStore::new());
    let provisioner = Provisioner::new(store.clone(), ShardSchema::with_ttl_days(30));
    provisioner
        .ensure_shard("svc-a", Utc::now().date_naive())
        .await
        .unwrap();
    let writer = LogWriter::new(store.clone(), "svc-a");
    let reader = LogReader::new(store.clone(), "svc-a");
    (store, writer, reader)
}

fn last_hour() -> RangeQuery {
    let now = Utc::now();
    RangeQuery::new(now - Duration::hours(1), now)
}

#[tokio::test]
async fn test_single_write_and_query() {
    let (_store, writer, reader) = setup().await;
    let original = record(5, Level::Info, "application started")
        .with_details(doc! { "version": "1.0.0", "port": 3000 });
    writer.write(&original).await.unwrap();

    let results = reader.query(&last_hour()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].message, "application started");
    assert_eq!(results[0].meta.service, "svc-a");
    assert_eq!(results[0].timestamp, original.timestamp);
    assert_eq!(results[0].details.get_i32("port").unwrap(), 3000);
}

#[tokio::test]
async fn test_bulk_write_returns_all_ids_and_queries_newest_first() {
    let (_store, writer, reader) = setup().await;
    let records: Vec<LogRecord> = (0..5)
        .map(|i| record(10 + i, Level::Info, &format!("event {i}")))
        .collect();
    let ids = writer.write_bulk(&records).await.unwrap();
    assert_eq!(ids.len(), 5);

    let results = reader.query(&last_hour()).await.unwrap();
    assert_eq!(results.len(), 5);
    for pair in results.windows(2) {
        assert!(pair[0].timestamp > pair[1].timestamp, "results must be newest first");
    }
}

#[tokio::test]
async fn test_level_filter_matches_exactly() {
    let (_store, writer, reader) = setup().await;
    writer
        .write_bulk(&[
            record(10, Level::Info, "ok"),
            record(9, Level::Error, "connection refused"),
            record(8, Level::Warn, "rate limit approaching"),
            record(7, Level::Error, "disk full"),
        ])
        .await
        .unwrap();

    let errors = reader.query(&last_hour().level(Level::Error)).await.unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|r| r.meta.level == Level::Error));
    assert_eq!(errors[0].message, "disk full");
}

#[tokio::test]
async fn test_limit_caps_results() {
    let (_store, writer, reader) = setup().await;
    let records: Vec<LogRecord> = (0..10)
        .map(|i| record(20 + i, Level::Info, &format!("event {i}")))
        .collect();
    writer.write_bulk(&records).await.unwrap();

    let results = reader.query(&last_hour().limit(3)).await.unwrap();
    assert_eq!(results.len(), 3);
    // The newest three.
    assert_eq!(results[0].message, "event 0");
    assert_eq!(results[2].message, "event 2");
}

#[tokio::test]
async fn test_uncovered_range_is_empty_not_an_error() {
    let (_store, writer, reader) = setup().await;
    writer.write(&record(5, Level::Info, "recent")).await.unwrap();

    let now = Utc::now();
    let query = RangeQuery::new(now - Duration::hours(2), now - Duration::hours(1));
    let results = reader.query(&query).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_write_without_shard_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let writer = LogWriter::new(store, "svc-a");
    let result = writer.write(&record(0, Level::Info, "orphan")).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_query_without_shard_is_not_found() {
    // Distinct from an empty result: the shard itself is missing.
    let store = Arc::new(MemoryStore::new());
    let reader = LogReader::new(store, "svc-a");
    let result = reader.query(&last_hour()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_bulk_write_all_or_nothing_on_missing_shard() {
    let store = Arc::new(MemoryStore::new());
    let writer = LogWriter::new(store.clone(), "svc-a");
    let records: Vec<LogRecord> = (0..3).map(|i| record(i, Level::Info, "x")).collect();
    assert!(matches!(
        writer.write_bulk(&records).await,
        Err(Error::NotFound(_))
    ));
}
