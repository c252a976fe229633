//! In-process document store
//!
//! Holds collections in memory and behaves like a remote store from the
//! outside: queries whose composite index is still building are rejected with
//! [`StoreError::MissingIndex`], listeners receive the full result set on
//! attach and whenever it changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use indexmap::IndexMap;
use lm_core::{Record, RecordId};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::query::{Query, QueryShape};
use crate::store::{DocumentStore, ListenerRegistration, SnapshotListener};
use crate::StoreError;

struct ListenerEntry {
    id: u64,
    query: Query,
    callback: Arc<SnapshotListener>,
    /// Last result delivered, to skip notifications that change nothing
    last: Option<Vec<Record>>,
}

type Listeners = Arc<Mutex<Vec<ListenerEntry>>>;

/// Document store backed by process memory
pub struct MemoryStore {
    name: String,
    collections: RwLock<AHashMap<String, IndexMap<RecordId, Record>>>,
    building_indexes: RwLock<AHashSet<QueryShape>>,
    read_failure: RwLock<Option<StoreError>>,
    listeners: Listeners,
    next_listener_id: AtomicU64,
    read_log: Mutex<Vec<Query>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(AHashMap::new()),
            building_indexes: RwLock::new(AHashSet::new()),
            read_failure: RwLock::new(None),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
            read_log: Mutex::new(Vec::new()),
        }
    }

    /// Insert or replace a record and notify affected listeners
    pub fn upsert(&self, collection: &str, record: Record) {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        self.notify(collection);
    }

    /// Remove a record and notify affected listeners
    pub fn remove(&self, collection: &str, id: &RecordId) -> Option<Record> {
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|records| records.shift_remove(id));
        if removed.is_some() {
            self.notify(collection);
        }
        removed
    }

    /// Mark the index serving queries of this shape as still building
    pub fn mark_index_building(&self, shape: QueryShape) {
        debug!("Index {} is building", shape);
        self.building_indexes.write().insert(shape);
    }

    /// Finish building an index
    pub fn finish_index(&self, shape: &QueryShape) {
        debug!("Index {} is ready", shape);
        self.building_indexes.write().remove(shape);
    }

    /// Make every subsequent one-shot read fail, or clear the failure
    pub fn set_read_failure(&self, failure: Option<StoreError>) {
        *self.read_failure.write() = failure;
    }

    /// Deliver an error to every listener of a collection and drop them
    pub fn fail_listeners(&self, collection: &str, error: StoreError) -> usize {
        let failed: Vec<Arc<SnapshotListener>> = {
            let mut listeners = self.listeners.lock();
            let (failed, kept): (Vec<_>, Vec<_>) = listeners
                .drain(..)
                .partition(|entry| entry.query.collection == collection);
            *listeners = kept;
            failed.into_iter().map(|entry| entry.callback).collect()
        };

        for callback in &failed {
            callback(Err(error.clone()));
        }
        failed.len()
    }

    /// Queries executed by one-shot reads, oldest first
    pub fn reads(&self) -> Vec<Query> {
        self.read_log.lock().clone()
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn execute(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        let shape = query.shape();
        if self.building_indexes.read().contains(&shape) {
            return Err(StoreError::MissingIndex(format!(
                "The query requires an index that is still building: {}",
                shape
            )));
        }

        let collections = self.collections.read();
        let mut records: Vec<Record> = collections
            .get(&query.collection)
            .map(|records| records.values().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();
        drop(collections);

        query.sort(&mut records);
        Ok(records)
    }

    fn notify(&self, collection: &str) {
        let queries: Vec<(u64, Query)> = self
            .listeners
            .lock()
            .iter()
            .filter(|entry| entry.query.collection == collection)
            .map(|entry| (entry.id, entry.query.clone()))
            .collect();

        let mut deliveries = Vec::new();
        for (id, query) in queries {
            let result = self.execute(&query);
            let mut listeners = self.listeners.lock();
            let Some(entry) = listeners.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            match result {
                Ok(records) => {
                    if entry.last.as_ref() != Some(&records) {
                        entry.last = Some(records.clone());
                        deliveries.push((entry.callback.clone(), Ok(records)));
                    }
                }
                Err(err) => {
                    // An error ends the subscription
                    let callback = entry.callback.clone();
                    listeners.retain(|e| e.id != id);
                    deliveries.push((callback, Err(err)));
                }
            }
        }

        // Callbacks run without any store lock held
        for (callback, result) in deliveries {
            trace!("Notifying listener on '{}'", collection);
            callback(result);
        }
    }

    fn detach(listeners: &Weak<Mutex<Vec<ListenerEntry>>>, id: u64) {
        if let Some(listeners) = listeners.upgrade() {
            listeners.lock().retain(|entry| entry.id != id);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.read_log.lock().push(query.clone());

        if let Some(failure) = self.read_failure.read().clone() {
            return Err(failure);
        }
        self.execute(query)
    }

    fn listen(
        &self,
        query: &Query,
        listener: SnapshotListener,
    ) -> Result<ListenerRegistration, StoreError> {
        let initial = self.execute(query)?;
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let callback = Arc::new(listener);

        self.listeners.lock().push(ListenerEntry {
            id,
            query: query.clone(),
            callback: callback.clone(),
            last: Some(initial.clone()),
        });
        debug!("Listener {} attached to '{}'", id, query.collection);

        callback(Ok(initial));

        let listeners = Arc::downgrade(&self.listeners);
        Ok(ListenerRegistration::new(move || {
            MemoryStore::detach(&listeners, id);
        }))
    }

    fn store_name(&self) -> &str {
        &self.name
    }
}
