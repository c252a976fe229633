//! Deferred release of renderer mounts
//!
//! Unmounting while a reconciliation pass is still running could tear down a
//! view the pass is reading from, so mounts are queued here and released
//! afterwards by a worker task or an explicit [`DisposalQueue::run_pending`].
//! A pass holds a [`PassGuard`]; the worker releases nothing while any guard
//! is alive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::MountedView;

/// Counts of released mounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisposalStats {
    pub disposed: usize,
    pub failed: usize,
}

struct QueueInner {
    pending: Mutex<VecDeque<Box<dyn MountedView>>>,
    wake: Arc<Notify>,
    active_passes: AtomicUsize,
    disposed: AtomicUsize,
    failed: AtomicUsize,
}

impl QueueInner {
    fn run_pending(&self) -> DisposalStats {
        let batch: Vec<_> = self.pending.lock().drain(..).collect();
        self.release(batch)
    }

    /// Release the queue unless a pass is open
    ///
    /// Checked under the queue lock, which `begin_pass` also takes.
    fn run_between_passes(&self) -> DisposalStats {
        let batch: Vec<_> = {
            let mut pending = self.pending.lock();
            if self.active_passes.load(Ordering::SeqCst) > 0 {
                return DisposalStats::default();
            }
            pending.drain(..).collect()
        };
        self.release(batch)
    }

    fn release(&self, batch: Vec<Box<dyn MountedView>>) -> DisposalStats {
        let mut stats = DisposalStats::default();

        for view in batch {
            let node_id = view.node_id();
            match view.unmount() {
                Ok(()) => {
                    trace!("Unmounted node {}", node_id);
                    stats.disposed += 1;
                }
                Err(err) => {
                    // The mount is gone either way; nothing to retry.
                    warn!("Failed to unmount node {}: {}", node_id, err);
                    stats.failed += 1;
                }
            }
        }

        self.disposed.fetch_add(stats.disposed, Ordering::SeqCst);
        self.failed.fetch_add(stats.failed, Ordering::SeqCst);
        stats
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        // Pending mounts still get released
        self.run_pending();
        self.wake.notify_one();
    }
}

/// Queue of mounts waiting to be released
#[derive(Clone)]
pub struct DisposalQueue {
    inner: Arc<QueueInner>,
}

impl DisposalQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(VecDeque::new()),
                wake: Arc::new(Notify::new()),
                active_passes: AtomicUsize::new(0),
                disposed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue a mount for release
    ///
    /// Inside a pass the worker is only woken once the last guard drops.
    pub fn schedule(&self, view: Box<dyn MountedView>) {
        self.inner.pending.lock().push_back(view);
        if self.inner.active_passes.load(Ordering::SeqCst) == 0 {
            self.inner.wake.notify_one();
        }
    }

    /// Hold back the worker until the returned guard drops
    pub fn begin_pass(&self) -> PassGuard {
        let _pending = self.inner.pending.lock();
        self.inner.active_passes.fetch_add(1, Ordering::SeqCst);
        PassGuard {
            inner: self.inner.clone(),
        }
    }

    /// Whether a pass currently holds the worker back
    pub fn in_pass(&self) -> bool {
        self.inner.active_passes.load(Ordering::SeqCst) > 0
    }

    /// Number of mounts waiting
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Release every queued mount now
    pub fn run_pending(&self) -> DisposalStats {
        self.inner.run_pending()
    }

    /// Totals since the queue was created
    pub fn stats(&self) -> DisposalStats {
        DisposalStats {
            disposed: self.inner.disposed.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    /// Spawn a task releasing mounts as they are queued
    ///
    /// The task exits once every handle to the queue is dropped.
    pub fn spawn_worker(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let wake = self.inner.wake.clone();

        tokio::spawn(async move {
            loop {
                wake.notified().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                // The guard that drops last wakes us again
                inner.run_between_passes();
            }
            trace!("Disposal worker stopped");
        })
    }
}

/// Marks a pass in progress; see [`DisposalQueue::begin_pass`]
#[must_use = "the pass ends when the guard drops"]
pub struct PassGuard {
    inner: Arc<QueueInner>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        if self.inner.active_passes.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.wake.notify_one();
        }
    }
}

impl Default for DisposalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RenderError;
    use uuid::Uuid;

    struct CountingView {
        id: Uuid,
        released: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MountedView for CountingView {
        fn node_id(&self) -> Uuid {
            self.id
        }

        fn unmount(self: Box<Self>) -> Result<(), RenderError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RenderError::UnmountFailed("detached twice".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn view(released: &Arc<AtomicUsize>, fail: bool) -> Box<dyn MountedView> {
        Box::new(CountingView {
            id: Uuid::new_v4(),
            released: released.clone(),
            fail,
        })
    }

    #[test]
    fn test_schedule_defers_until_run() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = DisposalQueue::new();

        queue.schedule(view(&released, false));
        queue.schedule(view(&released, true));
        queue.schedule(view(&released, false));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 3);

        let stats = queue.run_pending();
        assert_eq!(stats, DisposalStats { disposed: 2, failed: 1 });
        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_drop_releases_pending_mounts() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let queue = DisposalQueue::new();
            queue.schedule(view(&released, false));
            queue.schedule(view(&released, false));
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_releases_scheduled_mounts() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = DisposalQueue::new();
        let worker = queue.spawn_worker();

        queue.schedule(view(&released, false));
        for _ in 0..100 {
            if released.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().disposed, 1);

        drop(queue);
        tokio::time::timeout(std::time::Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_waits_for_open_pass() {
        let released = Arc::new(AtomicUsize::new(0));
        let queue = DisposalQueue::new();
        let _worker = queue.spawn_worker();

        let pass = queue.begin_pass();
        queue.schedule(view(&released, false));
        queue.schedule(view(&released, false));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(released.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 2);
        assert!(queue.in_pass());

        drop(pass);
        for _ in 0..100 {
            if released.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(!queue.in_pass());
    }
}
