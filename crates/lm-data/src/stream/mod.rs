//! Live record streams
//!
//! A [`RecordStream`] turns store listener callbacks into an ordered sequence
//! of [`Snapshot`]s refined by the adopted [`QueryPlan`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use lm_core::{Record, Snapshot};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};

use crate::negotiation::QueryPlan;
use crate::store::{DocumentStore, ListenerRegistration};
use crate::StoreError;

/// Errors surfaced by an open stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// The subscription failed after opening; it is not retried
    #[error("Subscription failed: {0}")]
    Fatal(StoreError),
}

type Batch = Result<Vec<Record>, StoreError>;

/// Shared close state between a stream and its closers
struct CloseState {
    closed: AtomicBool,
    notify: Notify,
    registration: Mutex<Option<ListenerRegistration>>,
}

impl CloseState {
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Some(mut registration) = self.registration.lock().take() {
            registration.remove();
        }
        // Single waiter; a stored permit covers a `next` that has not polled yet.
        self.notify.notify_one();
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Closes a stream from outside the task consuming it
#[derive(Clone)]
pub struct StreamCloser {
    state: Arc<CloseState>,
}

impl StreamCloser {
    /// Detach the store listener; returns false when already closed
    pub fn close(&self) -> bool {
        self.state.close()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

/// Ordered snapshots of one subscription
pub struct RecordStream {
    plan: QueryPlan,
    rx: mpsc::UnboundedReceiver<Batch>,
    state: Arc<CloseState>,
    sequence: u64,
}

impl RecordStream {
    /// Open a live subscription for an adopted plan
    pub fn open(store: &dyn DocumentStore, plan: QueryPlan) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel::<Batch>();

        let registration = store.listen(
            &plan.query(),
            Box::new(move |batch| {
                // Receiver gone means the stream was dropped
                let _ = tx.send(batch);
            }),
        )?;

        debug!(
            "Opened {} tier stream on '{}' for {}",
            plan.tier(),
            plan.target().collection,
            plan.target().owner
        );

        Ok(Self {
            plan,
            rx,
            state: Arc::new(CloseState {
                closed: AtomicBool::new(false),
                notify: Notify::new(),
                registration: Mutex::new(Some(registration)),
            }),
            sequence: 0,
        })
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn closer(&self) -> StreamCloser {
        StreamCloser {
            state: self.state.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once the stream is closed. A store error is returned
    /// once as [`StreamError::Fatal`] and closes the stream.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StreamError>> {
        if self.state.is_closed() {
            return None;
        }

        let batch = tokio::select! {
            biased;
            _ = self.state.notify.notified() => return None,
            batch = self.rx.recv() => batch?,
        };

        if self.state.is_closed() {
            return None;
        }

        match batch {
            Ok(records) => {
                self.sequence += 1;
                let records = self.plan.refine(records);
                Some(Ok(Snapshot::new(self.sequence, records)))
            }
            Err(err) => {
                error!(
                    "Subscription on '{}' failed: {}",
                    self.plan.target().collection,
                    err
                );
                self.state.close();
                Some(Err(StreamError::Fatal(err)))
            }
        }
    }

    /// Detach the store listener; idempotent
    pub fn close(&mut self) -> bool {
        self.state.close()
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        self.state.close();
    }
}
