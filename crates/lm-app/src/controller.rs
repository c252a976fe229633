//! Sync controller
//!
//! Owns one synchronization session at a time: negotiate a query tier, open
//! the record stream and drive the reconciler and viewport fitter from a
//! single processing task.

use std::sync::Arc;
use lm_core::events::{SessionStopped, SnapshotApplied, StreamFailed, TierAdopted};
use lm_core::{DateRange, EventBus, OwnerId, RecordId, SyncSettings};
use lm_data::{
    DocumentStore, NegotiationError, QueryNegotiator, QueryTarget, QueryTier, RecordStream,
    StoreError, StreamCloser, StreamError,
};
use lm_render::{DisposalQueue, Renderer};
use lm_views::{MarkerReconciler, ViewportFitter, VisualSurface};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors returned by [`SyncController::start`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Query setup failed: {0}")]
    Setup(#[from] NegotiationError),

    #[error("Could not subscribe: {0}")]
    Subscribe(#[from] StoreError),

    #[error("A sync session is already running")]
    AlreadyStarted,

    #[error("Start was cancelled by stop")]
    Cancelled,
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Idle,
    Negotiating,
    Live { tier: QueryTier },
    /// Feature temporarily unavailable
    Unavailable { reason: String },
}

struct Session {
    owner: OwnerId,
    tier: QueryTier,
    closer: StreamCloser,
    task: JoinHandle<()>,
    reconciler: Arc<Mutex<MarkerReconciler>>,
}

enum Phase {
    Idle,
    Negotiating { epoch: u64 },
    Running { epoch: u64, session: Session },
    Unavailable { reason: String },
}

struct ControllerState {
    phase: Phase,
    epoch: u64,
    disposal_worker: Option<JoinHandle<()>>,
}

/// Keeps a surface in sync with one owner's records
pub struct SyncController {
    store: Arc<dyn DocumentStore>,
    surface: Arc<dyn VisualSurface>,
    renderer: Arc<dyn Renderer>,
    settings: SyncSettings,
    disposal: DisposalQueue,
    events: Arc<EventBus>,
    state: Arc<Mutex<ControllerState>>,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        surface: Arc<dyn VisualSurface>,
        renderer: Arc<dyn Renderer>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            surface,
            renderer,
            settings,
            disposal: DisposalQueue::new(),
            events: Arc::new(EventBus::new()),
            state: Arc::new(Mutex::new(ControllerState {
                phase: Phase::Idle,
                epoch: 0,
                disposal_worker: None,
            })),
        }
    }

    /// Event bus carrying the session lifecycle events
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn disposal(&self) -> &DisposalQueue {
        &self.disposal
    }

    pub fn status(&self) -> SyncStatus {
        match &self.state.lock().phase {
            Phase::Idle => SyncStatus::Idle,
            Phase::Negotiating { .. } => SyncStatus::Negotiating,
            Phase::Running { session, .. } => SyncStatus::Live { tier: session.tier },
            Phase::Unavailable { reason } => SyncStatus::Unavailable {
                reason: reason.clone(),
            },
        }
    }

    /// Start syncing an owner's records within a date range
    ///
    /// Negotiates a tier once, then opens one subscription. Returns the
    /// adopted tier.
    pub async fn start(
        &self,
        owner: impl Into<OwnerId>,
        range: DateRange,
    ) -> Result<QueryTier, SyncError> {
        let owner = owner.into();
        let epoch = {
            let mut state = self.state.lock();
            if matches!(state.phase, Phase::Negotiating { .. } | Phase::Running { .. }) {
                return Err(SyncError::AlreadyStarted);
            }
            if state.disposal_worker.is_none() {
                state.disposal_worker = Some(self.disposal.spawn_worker());
            }
            let epoch = state.epoch + 1;
            state.epoch = epoch;
            state.phase = Phase::Negotiating { epoch };
            epoch
        };

        info!("Starting sync of '{}' for {}", self.settings.collection, owner);
        let target = QueryTarget::new(self.settings.collection.clone(), owner.clone(), range);
        let negotiated = QueryNegotiator::new(self.store.clone()).negotiate(&target).await;

        let mut state = self.state.lock();
        if !matches!(state.phase, Phase::Negotiating { epoch: current } if current == epoch) {
            info!("Start for {} cancelled during negotiation", owner);
            return Err(SyncError::Cancelled);
        }

        let negotiation = match negotiated {
            Ok(negotiation) => negotiation,
            Err(err) => {
                error!("Sync for {} unavailable: {}", owner, err);
                state.phase = Phase::Unavailable {
                    reason: err.to_string(),
                };
                return Err(SyncError::Setup(err));
            }
        };

        let tier = negotiation.plan.tier();
        let stream = match RecordStream::open(self.store.as_ref(), negotiation.plan) {
            Ok(stream) => stream,
            Err(err) => {
                error!("Could not subscribe for {}: {}", owner, err);
                state.phase = Phase::Unavailable {
                    reason: err.to_string(),
                };
                return Err(SyncError::Subscribe(err));
            }
        };

        let reconciler = Arc::new(Mutex::new(MarkerReconciler::new(
            self.surface.clone(),
            self.renderer.clone(),
            self.disposal.clone(),
            self.settings.focus.clone(),
        )));
        let closer = stream.closer();
        let processing = Processing {
            stream,
            reconciler: reconciler.clone(),
            fitter: ViewportFitter::new(self.surface.clone(), self.settings.fit.clone()),
            events: self.events.clone(),
            state: self.state.clone(),
            epoch,
            owner: owner.clone(),
            adopted: TierAdopted {
                collection: self.settings.collection.clone(),
                owner: owner.to_string(),
                tier: tier.to_string(),
                probes: negotiation.attempts.len(),
            },
        };
        let task = tokio::spawn(processing.run());

        state.phase = Phase::Running {
            epoch,
            session: Session {
                owner,
                tier,
                closer,
                task,
                reconciler,
            },
        };
        Ok(tier)
    }

    /// Stop the current session
    ///
    /// Returns false when there was nothing to stop.
    pub fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut self.state.lock().phase, Phase::Idle);

        match previous {
            Phase::Running { session, .. } => {
                self.end_session(session);
                true
            }
            Phase::Negotiating { .. } => {
                info!("Cancelling sync start in negotiation");
                true
            }
            Phase::Unavailable { .. } | Phase::Idle => false,
        }
    }

    /// Stop, then start again for a new owner or window
    pub async fn restart(
        &self,
        owner: impl Into<OwnerId>,
        range: DateRange,
    ) -> Result<QueryTier, SyncError> {
        self.stop();
        self.start(owner, range).await
    }

    /// Forward a marker click to the live session
    pub fn activate(&self, id: &RecordId) -> bool {
        let reconciler = match &self.state.lock().phase {
            Phase::Running { session, .. } => session.reconciler.clone(),
            _ => return false,
        };
        let fired = reconciler.lock().activate(id);
        fired
    }

    fn end_session(&self, session: Session) {
        session.closer.close();
        session.task.abort();
        let report = session.reconciler.lock().teardown();

        info!(
            "Stopped sync for {}: {} marker(s) removed",
            session.owner, report.destroyed
        );
        self.events.publish(SessionStopped {
            owner: session.owner.to_string(),
            widgets_destroyed: report.destroyed,
            teardown_failures: report.failures,
        });
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved into the processing task of one session
struct Processing {
    stream: RecordStream,
    reconciler: Arc<Mutex<MarkerReconciler>>,
    fitter: ViewportFitter,
    events: Arc<EventBus>,
    state: Arc<Mutex<ControllerState>>,
    epoch: u64,
    owner: OwnerId,
    adopted: TierAdopted,
}

impl Processing {
    /// Handle snapshots one at a time, in delivery order
    async fn run(mut self) {
        self.events.publish(self.adopted.clone());

        while let Some(item) = self.stream.next().await {
            match item {
                Ok(snapshot) => {
                    let report = {
                        let mut reconciler = self.reconciler.lock();
                        if reconciler.is_retired() {
                            break;
                        }
                        reconciler.reconcile(&snapshot)
                    };
                    self.fitter.fit(&snapshot);

                    self.events.publish(SnapshotApplied {
                        sequence: snapshot.sequence(),
                        records: snapshot.len(),
                        created: report.created,
                        replaced: report.replaced,
                        removed: report.removed,
                    });
                }
                Err(StreamError::Fatal(err)) => {
                    self.fail(err);
                    break;
                }
            }
        }
        debug!("Processing task for {} finished", self.owner);
    }

    fn fail(&self, err: StoreError) {
        let report = self.reconciler.lock().teardown();
        if report.failures > 0 {
            warn!("{} marker(s) failed to detach after stream failure", report.failures);
        }

        let stale = {
            let mut state = self.state.lock();
            let current =
                matches!(&state.phase, Phase::Running { epoch, .. } if *epoch == self.epoch);
            current.then(|| {
                std::mem::replace(
                    &mut state.phase,
                    Phase::Unavailable {
                        reason: err.to_string(),
                    },
                )
            })
        };
        // The session's own task handle is dropped here, detaching this task
        drop(stale);

        self.events.publish(StreamFailed {
            owner: self.owner.to_string(),
            error: err.to_string(),
        });
    }
}
