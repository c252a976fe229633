use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lm_app::{SyncController, SyncError, SyncStatus};
use lm_core::events::{SessionStopped, SnapshotApplied, StreamFailed};
use lm_core::{handler_from_fn, DateRange, Emotion, GeoPoint, Record, SyncSettings};
use lm_data::{
    DocumentStore, ListenerRegistration, MemoryStore, NegotiationError, Query, QueryPlan,
    QueryTarget, QueryTier, SnapshotListener, StoreError,
};
use lm_render::HeadlessRenderer;
use lm_views::HeadlessSurface;
use parking_lot::Mutex;
use tokio::sync::Notify;

const COLLECTION: &str = "memories";

fn range() -> DateRange {
    DateRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap(),
    )
    .unwrap()
}

fn record(id: &str, owner: &str, lat: f64, lng: f64) -> Record {
    Record::new(
        id,
        owner,
        GeoPoint::new(lat, lng).unwrap(),
        format!("memory {}", id),
        Emotion::Happy,
        Utc.with_ymd_and_hms(2024, 5, 17, 10, 0, 0).unwrap(),
    )
}

fn shape(tier: QueryTier, owner: &str) -> lm_data::QueryShape {
    QueryPlan::new(tier, QueryTarget::new(COLLECTION, owner, range()))
        .query()
        .shape()
}

struct Fixture {
    store: Arc<MemoryStore>,
    surface: HeadlessSurface,
    renderer: HeadlessRenderer,
    controller: Arc<SyncController>,
}

fn fixture_with(store: Arc<dyn DocumentStore>, memory: Arc<MemoryStore>) -> Fixture {
    let settings = SyncSettings::default();
    let surface = HeadlessSurface::new(&settings.initial_view);
    let renderer = HeadlessRenderer::new();
    let controller = Arc::new(SyncController::new(
        store,
        Arc::new(surface.clone()),
        Arc::new(renderer.clone()),
        settings,
    ));
    Fixture {
        store: memory,
        surface,
        renderer,
        controller,
    }
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new("memory"));
    fixture_with(store.clone(), store)
}

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Store whose probe reads wait for a permit
struct GatedStore {
    inner: Arc<MemoryStore>,
    gate: Arc<Notify>,
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn get(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.gate.notified().await;
        self.inner.get(query).await
    }

    fn listen(
        &self,
        query: &Query,
        listener: SnapshotListener,
    ) -> Result<ListenerRegistration, StoreError> {
        self.inner.listen(query, listener)
    }

    fn store_name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn test_session_reconciles_and_fits_until_stopped() {
    let f = fixture();
    f.store.mark_index_building(shape(QueryTier::Strict, "alice"));
    f.store.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));
    f.store.upsert(COLLECTION, record("montmartre", "alice", 48.87, 2.40));
    f.store.upsert(COLLECTION, record("rome", "alice", 41.90, 12.49));
    f.store.upsert(COLLECTION, record("london", "bob", 51.50, -0.12));

    let applied = Arc::new(Mutex::new(0usize));
    let sink = applied.clone();
    f.controller.events().subscribe::<SnapshotApplied>(handler_from_fn(move |_| {
        *sink.lock() += 1;
    }));

    let tier = f.controller.start("alice", range()).await.unwrap();
    assert_eq!(tier, QueryTier::Relaxed);
    assert_eq!(f.controller.status(), SyncStatus::Live { tier: QueryTier::Relaxed });

    eventually("first snapshot", || f.surface.marker_count() == 3).await;
    let fit = f.surface.fits().last().cloned().unwrap();
    assert_eq!((fit.south_west().y, fit.south_west().x), (41.90, 2.35));
    assert_eq!((fit.north_east().y, fit.north_east().x), (48.87, 12.49));

    assert!(f.controller.activate(&"rome".into()));
    assert_eq!(f.surface.flights().len(), 1);

    f.store.upsert(COLLECTION, record("florence", "alice", 43.77, 11.25));
    eventually("second snapshot", || f.surface.marker_count() == 4).await;
    assert_eq!(*applied.lock(), 2);

    assert!(f.controller.stop());
    assert_eq!(f.surface.marker_count(), 0);
    assert_eq!(f.store.listener_count(), 0);
    assert_eq!(f.controller.status(), SyncStatus::Idle);
    assert!(!f.controller.activate(&"rome".into()));

    eventually("mounts released", || f.renderer.live_count() == 0).await;
}

#[tokio::test]
async fn test_stop_twice_is_a_noop() {
    let f = fixture();
    f.store.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));

    let stopped = Arc::new(Mutex::new(Vec::new()));
    let sink = stopped.clone();
    f.controller.events().subscribe::<SessionStopped>(handler_from_fn(move |event| {
        if let Some(stop) = event.as_any().downcast_ref::<SessionStopped>() {
            sink.lock().push((stop.widgets_destroyed, stop.teardown_failures));
        }
    }));

    f.controller.start("alice", range()).await.unwrap();
    eventually("marker", || f.surface.marker_count() == 1).await;

    assert!(f.controller.stop());
    assert!(!f.controller.stop());
    assert_eq!(*stopped.lock(), vec![(1, 0)]);
    assert_eq!(f.store.listener_count(), 0);
    assert_eq!(f.surface.removed_count(), 1);
}

#[tokio::test]
async fn test_exhausted_tiers_open_no_subscription() {
    let f = fixture();
    for tier in QueryTier::FALLBACK_ORDER {
        f.store.mark_index_building(shape(tier, "alice"));
    }
    f.store.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));

    let err = f.controller.start("alice", range()).await.unwrap_err();

    assert!(matches!(err, SyncError::Setup(NegotiationError::Exhausted { .. })));
    assert_eq!(f.store.reads().len(), 3);
    assert_eq!(f.store.listener_count(), 0);
    assert!(matches!(f.controller.status(), SyncStatus::Unavailable { .. }));
    assert_eq!(f.surface.marker_count(), 0);
    assert!(!f.controller.stop());
}

#[tokio::test]
async fn test_non_degradable_probe_error_is_setup_fatal() {
    let f = fixture();
    f.store
        .set_read_failure(Some(StoreError::from_code("permission-denied", "rules reject owner")));

    let err = f.controller.start("alice", range()).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::Setup(NegotiationError::Store {
            tier: QueryTier::Strict,
            ..
        })
    ));
    assert_eq!(f.store.reads().len(), 1);
    assert_eq!(f.store.listener_count(), 0);
}

#[tokio::test]
async fn test_stream_failure_makes_sync_unavailable() {
    let f = fixture();
    f.store.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));
    f.store.upsert(COLLECTION, record("rome", "alice", 41.90, 12.49));

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    f.controller.events().subscribe::<StreamFailed>(handler_from_fn(move |event| {
        if let Some(failed) = event.as_any().downcast_ref::<StreamFailed>() {
            sink.lock().push(failed.error.clone());
        }
    }));

    f.controller.start("alice", range()).await.unwrap();
    eventually("markers", || f.surface.marker_count() == 2).await;

    let notified = f
        .store
        .fail_listeners(COLLECTION, StoreError::from_code("permission-denied", "session revoked"));
    assert_eq!(notified, 1);

    eventually("unavailable", || {
        matches!(f.controller.status(), SyncStatus::Unavailable { .. })
    })
    .await;
    assert_eq!(f.surface.marker_count(), 0);
    assert_eq!(failures.lock().len(), 1);
    assert!(!f.controller.stop());

    // A fresh start recovers once the backend accepts the listener again
    f.controller.start("alice", range()).await.unwrap();
    eventually("markers again", || f.surface.marker_count() == 2).await;
}

#[tokio::test]
async fn test_stop_during_negotiation_cancels_start() {
    let memory = Arc::new(MemoryStore::new("memory"));
    memory.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));
    let gate = Arc::new(Notify::new());
    let gated = Arc::new(GatedStore {
        inner: memory.clone(),
        gate: gate.clone(),
    });
    let f = fixture_with(gated, memory);

    let controller = f.controller.clone();
    let start = tokio::spawn(async move { controller.start("alice", range()).await });

    eventually("negotiating", || f.controller.status() == SyncStatus::Negotiating).await;
    assert!(f.controller.stop());
    gate.notify_one();

    let result = start.await.unwrap();
    assert_eq!(result, Err(SyncError::Cancelled));
    assert_eq!(f.store.listener_count(), 0);
    assert_eq!(f.controller.status(), SyncStatus::Idle);
    assert_eq!(f.surface.marker_count(), 0);
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let f = fixture();
    f.controller.start("alice", range()).await.unwrap();

    let again = f.controller.start("alice", range()).await;
    assert_eq!(again, Err(SyncError::AlreadyStarted));
    assert_eq!(f.store.listener_count(), 1);
}

#[tokio::test]
async fn test_restart_switches_owner() {
    let f = fixture();
    f.store.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));
    f.store.upsert(COLLECTION, record("london", "bob", 51.50, -0.12));
    f.store.upsert(COLLECTION, record("dublin", "bob", 53.35, -6.26));

    f.controller.start("alice", range()).await.unwrap();
    eventually("alice's marker", || f.surface.marker_count() == 1).await;

    f.controller.restart("bob", range()).await.unwrap();
    eventually("bob's markers", || f.surface.marker_count() == 2).await;

    assert_eq!(f.store.listener_count(), 1);
    assert!(f.surface.nodes_at(GeoPoint::new(48.85, 2.35).unwrap()).is_empty());
    assert_eq!(f.surface.nodes_at(GeoPoint::new(53.35, -6.26).unwrap()).len(), 1);
}

#[tokio::test]
async fn test_handler_can_stop_the_controller() {
    let f = fixture();
    f.store.upsert(COLLECTION, record("paris", "alice", 48.85, 2.35));

    let weak = Arc::downgrade(&f.controller);
    f.controller.events().subscribe::<SnapshotApplied>(handler_from_fn(move |_| {
        if let Some(controller) = weak.upgrade() {
            controller.stop();
        }
    }));
    let stops = Arc::new(Mutex::new(0usize));
    let sink = stops.clone();
    f.controller.events().subscribe::<SessionStopped>(handler_from_fn(move |_| {
        *sink.lock() += 1;
    }));

    f.controller.start("alice", range()).await.unwrap();
    eventually("stopped from a handler", || *stops.lock() == 1).await;

    assert_eq!(f.controller.status(), SyncStatus::Idle);
    assert_eq!(f.surface.marker_count(), 0);
    assert_eq!(f.store.listener_count(), 0);

    // The bus stays usable from another thread afterwards
    let bus = f.controller.events().clone();
    let publish = tokio::task::spawn_blocking(move || {
        bus.publish(SessionStopped {
            owner: "alice".to_string(),
            widgets_destroyed: 0,
            teardown_failures: 0,
        })
    });
    tokio::time::timeout(Duration::from_millis(500), publish)
        .await
        .expect("publish returned")
        .unwrap();
    assert_eq!(*stops.lock(), 2);
}
