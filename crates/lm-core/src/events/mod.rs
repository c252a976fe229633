//! Lifecycle event bus
//!
//! Handlers are registered per event type and called in subscription order.
//! The registry lock is released before any handler runs, so a handler may
//! subscribe, publish other event types, or drive the component that
//! published the event.

use std::any::{Any, TypeId};
use std::sync::Arc;
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

/// Implemented by every event carried on the bus
pub trait Event: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

/// Receives published events of the type it was subscribed to
pub trait EventHandler: Send + Sync {
    fn handle(&mut self, event: &dyn Event);
}

/// One subscribed handler; locked only while it runs
type HandlerSlot = Arc<Mutex<Box<dyn EventHandler>>>;

/// Type-keyed bus for synchronization lifecycle notifications
pub struct EventBus {
    slots: RwLock<AHashMap<TypeId, Vec<HandlerSlot>>>,
}

/// Synchronization events
pub mod events {
    use super::Event;

    /// A query tier passed its probe and is now serving the subscription
    #[derive(Debug, Clone)]
    pub struct TierAdopted {
        pub collection: String,
        pub owner: String,
        pub tier: String,
        pub probes: usize,
    }

    /// A snapshot was reconciled onto the surface
    #[derive(Debug, Clone)]
    pub struct SnapshotApplied {
        pub sequence: u64,
        pub records: usize,
        pub created: usize,
        pub replaced: usize,
        pub removed: usize,
    }

    /// The live subscription failed after opening
    #[derive(Debug, Clone)]
    pub struct StreamFailed {
        pub owner: String,
        pub error: String,
    }

    /// A session was stopped and its widgets torn down
    #[derive(Debug, Clone)]
    pub struct SessionStopped {
        pub owner: String,
        pub widgets_destroyed: usize,
        pub teardown_failures: usize,
    }

    macro_rules! impl_event {
        ($($t:ty),*) => {
            $(
                impl Event for $t {
                    fn as_any(&self) -> &dyn std::any::Any {
                        self
                    }
                }
            )*
        }
    }

    impl_event!(TierAdopted, SnapshotApplied, StreamFailed, SessionStopped);
}

pub use events::{SessionStopped, SnapshotApplied, StreamFailed, TierAdopted};

impl EventBus {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(AHashMap::new()),
        }
    }

    /// Register a handler for events of type `E`
    pub fn subscribe<E: Event>(&self, handler: Box<dyn EventHandler>) {
        self.slots
            .write()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Arc::new(Mutex::new(handler)));
    }

    /// Number of handlers registered for `E`
    pub fn handler_count<E: Event>(&self) -> usize {
        self.slots
            .read()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every handler of its type
    ///
    /// A handler must not publish the event type it is handling.
    pub fn publish<E: Event>(&self, event: E) {
        let targets: Vec<HandlerSlot> = match self.slots.read().get(&TypeId::of::<E>()) {
            Some(slots) => slots.clone(),
            None => return,
        };

        trace!(
            "Publishing {} to {} handler(s)",
            std::any::type_name::<E>(),
            targets.len()
        );
        for slot in targets {
            slot.lock().handle(&event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts a closure to [`EventHandler`]
struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(&dyn Event) + Send + Sync,
{
    fn handle(&mut self, event: &dyn Event) {
        (self.0)(event);
    }
}

/// Box a closure as an event handler
pub fn handler_from_fn<F>(f: F) -> Box<dyn EventHandler>
where
    F: FnMut(&dyn Event) + Send + Sync + 'static,
{
    Box::new(FnHandler(f))
}
