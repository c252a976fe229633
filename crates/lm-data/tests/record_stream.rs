use std::sync::Arc;

use chrono::{TimeZone, Utc};
use lm_core::{DateRange, Emotion, GeoPoint, Record, RecordId};
use lm_data::{
    MemoryStore, QueryPlan, QueryTarget, QueryTier, RecordStream, StoreError, StreamError,
};

const COLLECTION: &str = "memories";

fn target() -> QueryTarget {
    let range = DateRange::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap(),
    )
    .unwrap();
    QueryTarget::new(COLLECTION, "alice", range)
}

fn record(id: &str, owner: &str, month: u32, day: u32) -> Record {
    Record::new(
        id,
        owner,
        GeoPoint::new(48.85, 2.35).unwrap(),
        format!("memory {}", id),
        Emotion::Excited,
        Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).unwrap(),
    )
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new("memory"));
    // Inserted out of date order on purpose
    store.upsert(COLLECTION, record("june-20", "alice", 6, 20));
    store.upsert(COLLECTION, record("july-02", "alice", 7, 2));
    store.upsert(COLLECTION, record("june-03", "alice", 6, 3));
    store.upsert(COLLECTION, record("bob-june", "bob", 6, 10));
    store
}

fn open(store: &Arc<MemoryStore>, tier: QueryTier, target: QueryTarget) -> RecordStream {
    RecordStream::open(store.as_ref(), QueryPlan::new(tier, target)).unwrap()
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_every_tier_yields_the_same_snapshot() {
    let store = seeded_store();

    for tier in QueryTier::FALLBACK_ORDER {
        let mut stream = open(&store, tier, target());
        let snapshot = stream.next().await.unwrap().unwrap();

        assert_eq!(snapshot.sequence(), 1, "tier {}", tier);
        assert_eq!(ids(snapshot.records()), vec!["june-03", "june-20"], "tier {}", tier);
    }
}

#[tokio::test]
async fn test_changes_produce_ordered_snapshots() {
    let store = seeded_store();
    let mut stream = open(&store, QueryTier::Basic, target());

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 2);

    store.upsert(COLLECTION, record("june-10", "alice", 6, 10));
    store.remove(COLLECTION, &RecordId::from("june-20"));

    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.sequence(), 2);
    assert_eq!(ids(second.records()), vec!["june-03", "june-10", "june-20"]);

    let third = stream.next().await.unwrap().unwrap();
    assert_eq!(third.sequence(), 3);
    assert_eq!(ids(third.records()), vec!["june-03", "june-10"]);
}

#[tokio::test]
async fn test_store_error_is_fatal_and_ends_stream() {
    let store = seeded_store();
    let mut stream = open(&store, QueryTier::Strict, target());
    assert!(stream.next().await.unwrap().is_ok());

    let error = StoreError::from_code("permission-denied", "revoked");
    assert_eq!(store.fail_listeners(COLLECTION, error.clone()), 1);

    assert_eq!(stream.next().await, Some(Err(StreamError::Fatal(error))));
    assert!(stream.is_closed());
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_close_detaches_listener_once() {
    let store = seeded_store();
    let mut stream = open(&store, QueryTier::Strict, target());
    assert_eq!(store.listener_count(), 1);

    let closer = stream.closer();
    assert!(closer.close());
    assert!(!stream.close());
    assert_eq!(store.listener_count(), 0);

    // The initial batch is buffered but must not surface after close
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn test_dropping_stream_detaches_listener() {
    let store = seeded_store();
    {
        let _stream = open(&store, QueryTier::Relaxed, target());
        assert_eq!(store.listener_count(), 1);
    }
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn test_open_fails_while_index_builds() {
    let store = seeded_store();
    let plan = QueryPlan::new(QueryTier::Strict, target());
    store.mark_index_building(plan.query().shape());

    let err = RecordStream::open(store.as_ref(), plan).err().unwrap();
    assert!(err.is_degradable());
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn test_failing_requery_detaches_listener() {
    let store = seeded_store();
    let plan = QueryPlan::new(QueryTier::Strict, target());
    let shape = plan.query().shape();
    let mut stream = RecordStream::open(store.as_ref(), plan).unwrap();
    assert!(stream.next().await.unwrap().is_ok());

    // The index disappears under a live listener
    store.mark_index_building(shape);
    store.upsert(COLLECTION, record("june-11", "alice", 6, 11));

    assert!(matches!(
        stream.next().await,
        Some(Err(StreamError::Fatal(StoreError::MissingIndex(_))))
    ));
    assert_eq!(store.listener_count(), 0);

    store.upsert(COLLECTION, record("june-12", "alice", 6, 12));
    assert_eq!(stream.next().await, None);
}
