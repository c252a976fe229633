//! Headless demo of the memory map sync
//!
//! Runs a session against an in-memory store whose date index is still
//! building, then restarts once the index is ready.

use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lm_app::SyncController;
use lm_core::events::{SnapshotApplied, TierAdopted};
use lm_core::{handler_from_fn, DateRange, Emotion, GeoPoint, Record, SyncSettings};
use lm_data::{MemoryStore, QueryPlan, QueryTarget, QueryTier};
use lm_render::HeadlessRenderer;
use lm_views::HeadlessSurface;

const OWNER: &str = "alice";

fn memory(
    id: &str,
    (lat, lng): (f64, f64),
    label: &str,
    emotion: Emotion,
    (month, day): (u32, u32),
) -> Result<Record> {
    let timestamp = Utc
        .with_ymd_and_hms(2024, month, day, 18, 0, 0)
        .single()
        .context("invalid demo timestamp")?;
    Ok(Record::new(id, OWNER, GeoPoint::new(lat, lng)?, label, emotion, timestamp))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = match std::env::args().nth(1) {
        Some(path) => SyncSettings::load(&path)
            .with_context(|| format!("loading settings from {}", path))?,
        None => SyncSettings::default(),
    };
    info!("Starting memory map sync demo on '{}'", settings.collection);

    let range = DateRange::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().context("invalid range start")?,
        Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).single().context("invalid range end")?,
    )?;

    let store = Arc::new(MemoryStore::new("memory"));
    let target = QueryTarget::new(settings.collection.clone(), OWNER, range);
    let strict_shape = QueryPlan::new(QueryTier::Strict, target).query().shape();
    store.mark_index_building(strict_shape.clone());

    let seed = [
        ("notre-dame", (48.8530, 2.3499), "Evening by the river", Emotion::Peaceful, (4, 12)),
        ("montmartre", (48.8867, 2.3431), "Sunrise on the steps", Emotion::Happy, (5, 3)),
        ("colosseum", (41.8902, 12.4922), "First trip to Rome", Emotion::Excited, (8, 21)),
    ];
    for (id, position, label, emotion, date) in seed {
        store.upsert(&settings.collection, memory(id, position, label, emotion, date)?);
    }

    let surface = HeadlessSurface::new(&settings.initial_view);
    let renderer = HeadlessRenderer::new();
    let controller = SyncController::new(
        store.clone(),
        Arc::new(surface.clone()),
        Arc::new(renderer.clone()),
        settings.clone(),
    );

    controller.events().subscribe::<TierAdopted>(handler_from_fn(|event| {
        if let Some(adopted) = event.as_any().downcast_ref::<TierAdopted>() {
            info!("Serving {} with the {} tier", adopted.owner, adopted.tier);
        }
    }));
    controller.events().subscribe::<SnapshotApplied>(handler_from_fn(|event| {
        if let Some(applied) = event.as_any().downcast_ref::<SnapshotApplied>() {
            info!(
                "Snapshot {}: {} record(s), +{} ~{} -{}",
                applied.sequence,
                applied.records,
                applied.created,
                applied.replaced,
                applied.removed
            );
        }
    }));

    let tier = controller.start(OWNER, range).await?;
    info!("Sync live on the {} tier", tier);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let louvre = memory(
        "louvre",
        (48.8606, 2.3376),
        "Rainy afternoon",
        Emotion::Nostalgic,
        (10, 2),
    )?;
    store.upsert(&settings.collection, louvre);
    tokio::time::sleep(Duration::from_millis(50)).await;

    controller.activate(&"colosseum".into());
    let camera = surface.camera();
    info!("Camera at ({:.4}, {:.4}) zoom {:.1}", camera.lat, camera.lng, camera.zoom);

    store.finish_index(&strict_shape);
    let tier = controller.restart(OWNER, range).await?;
    info!("Restarted on the {} tier", tier);
    tokio::time::sleep(Duration::from_millis(50)).await;

    controller.stop();
    let released = controller.disposal().run_pending();
    info!(
        "Stopped: {} marker(s) left, {} live mount(s), {} released on shutdown",
        surface.marker_count(),
        renderer.live_count(),
        released.disposed
    );

    Ok(())
}
