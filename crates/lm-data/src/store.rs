//! Document store abstraction

use async_trait::async_trait;
use lm_core::Record;

use crate::query::Query;
use crate::StoreError;

/// Callback receiving the full matching set on every change
pub type SnapshotListener = Box<dyn Fn(Result<Vec<Record>, StoreError>) + Send + Sync>;

/// Trait for remote document stores
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot filtered and ordered read
    async fn get(&self, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Attach a live listener
    ///
    /// The listener is invoked with the current result set once attached and
    /// again every time it changes, until the registration is removed. After
    /// delivering an error the store drops the listener.
    fn listen(
        &self,
        query: &Query,
        listener: SnapshotListener,
    ) -> Result<ListenerRegistration, StoreError>;

    /// Get the store name
    fn store_name(&self) -> &str;
}

/// Handle detaching a live listener
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }

    /// Detach the listener; returns false when it was already detached
    pub fn remove(&mut self) -> bool {
        match self.detach.take() {
            Some(detach) => {
                detach();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_remove_detaches_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registration.is_active());
        assert!(registration.remove());
        assert!(!registration.remove());
        assert!(!registration.is_active());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
