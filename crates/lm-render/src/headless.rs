//! Renderer without a display
//!
//! Keeps every live mount in memory so callers can inspect marker content and
//! trigger activations. Used by the demo binary and by tests.

use std::sync::Arc;
use ahash::{AHashMap, AHashSet};
use lm_core::RecordId;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{MarkerView, MountNode, MountedView, RenderError, Renderer};

#[derive(Default)]
struct HeadlessState {
    live: AHashMap<Uuid, MarkerView>,
    mounts: usize,
    unmounts: usize,
    failing_mounts: AHashSet<RecordId>,
    fail_unmounts: bool,
}

/// Renderer recording mounts in memory
#[derive(Clone, Default)]
pub struct HeadlessRenderer {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful mounts
    pub fn mount_count(&self) -> usize {
        self.state.lock().mounts
    }

    /// Total unmount calls, failed ones included
    pub fn unmount_count(&self) -> usize {
        self.state.lock().unmounts
    }

    /// Mounts not yet released
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Live views rendering the given record
    pub fn views_for(&self, id: &RecordId) -> Vec<MarkerView> {
        self.state
            .lock()
            .live
            .values()
            .filter(|view| &view.record_id == id)
            .cloned()
            .collect()
    }

    /// Make mounts for a record fail
    pub fn fail_mounts_for(&self, id: impl Into<RecordId>) {
        self.state.lock().failing_mounts.insert(id.into());
    }

    pub fn clear_mount_failures(&self) {
        self.state.lock().failing_mounts.clear();
    }

    /// Make unmounts report an error (the mount is still released)
    pub fn set_fail_unmounts(&self, fail: bool) {
        self.state.lock().fail_unmounts = fail;
    }
}

impl Renderer for HeadlessRenderer {
    fn mount(
        &self,
        node: &MountNode,
        view: MarkerView,
    ) -> Result<Box<dyn MountedView>, RenderError> {
        let mut state = self.state.lock();
        if state.failing_mounts.contains(&view.record_id) {
            return Err(RenderError::MountFailed(format!(
                "cannot render marker for {}",
                view.record_id
            )));
        }

        debug!(
            "Mounted {} {} into node {}",
            view.glyph, view.label, node.id
        );
        state.mounts += 1;
        state.live.insert(node.id, view);

        Ok(Box::new(HeadlessMount {
            node_id: node.id,
            state: self.state.clone(),
        }))
    }
}

struct HeadlessMount {
    node_id: Uuid,
    state: Arc<Mutex<HeadlessState>>,
}

impl MountedView for HeadlessMount {
    fn node_id(&self) -> Uuid {
        self.node_id
    }

    fn unmount(self: Box<Self>) -> Result<(), RenderError> {
        let mut state = self.state.lock();
        state.unmounts += 1;
        state.live.remove(&self.node_id);

        if state.fail_unmounts {
            Err(RenderError::UnmountFailed(format!("node {} was already detached", self.node_id)))
        } else {
            Ok(())
        }
    }
}
