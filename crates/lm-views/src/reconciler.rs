//! Marker reconciliation
//!
//! Maps each snapshot onto the set of live marker widgets. Every record in
//! the snapshot gets exactly one widget; widgets of records that left the
//! snapshot are destroyed. Records are immutable-by-replacement, so a widget
//! is rebuilt only when the incoming value differs from the rendered one.

use std::sync::Arc;
use indexmap::IndexMap;
use lm_core::{FocusSettings, Record, RecordId, Snapshot};
use lm_render::{DisposalQueue, Renderer};
use tracing::{debug, info, warn};

use crate::surface::VisualSurface;
use crate::widget::{ManagedWidget, WidgetError};

/// What one pass changed
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: usize,
    pub replaced: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Records left without a widget; retried on the next snapshot
    pub failed: Vec<(RecordId, WidgetError)>,
}

impl ReconcileReport {
    /// True when the pass created and destroyed nothing
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.replaced == 0 && self.removed == 0 && self.failed.is_empty()
    }
}

/// Outcome of a full teardown
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub destroyed: usize,
    pub failures: usize,
}

/// Sole owner of the marker widgets of one map
pub struct MarkerReconciler {
    surface: Arc<dyn VisualSurface>,
    renderer: Arc<dyn Renderer>,
    disposal: DisposalQueue,
    focus: FocusSettings,
    registry: IndexMap<RecordId, ManagedWidget>,
    retired: bool,
}

impl MarkerReconciler {
    pub fn new(
        surface: Arc<dyn VisualSurface>,
        renderer: Arc<dyn Renderer>,
        disposal: DisposalQueue,
        focus: FocusSettings,
    ) -> Self {
        Self {
            surface,
            renderer,
            disposal,
            focus,
            registry: IndexMap::new(),
            retired: false,
        }
    }

    /// Bring the widgets in line with a snapshot
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.retired {
            debug!("Ignoring snapshot {} after teardown", snapshot.sequence());
            return report;
        }
        let _pass = self.disposal.begin_pass();

        // Last occurrence of an id wins
        let mut incoming: IndexMap<&RecordId, &Record> = IndexMap::with_capacity(snapshot.len());
        for record in snapshot.iter() {
            incoming.insert(&record.id, record);
        }

        let to_remove: Vec<RecordId> = self
            .registry
            .keys()
            .filter(|id| !incoming.contains_key(id))
            .cloned()
            .collect();

        for id in to_remove {
            if let Some(widget) = self.registry.shift_remove(&id) {
                self.release(&id, widget);
                report.removed += 1;
            }
        }

        for (id, record) in incoming {
            let replacing = match self.registry.get(id) {
                Some(widget) if widget.record() == record => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => true,
                None => false,
            };

            // The old handler is disarmed before the new one exists
            if let Some(old) = self.registry.shift_remove(id) {
                self.release(id, old);
            }

            let built = ManagedWidget::build(
                record,
                &self.surface,
                self.renderer.as_ref(),
                &self.disposal,
                &self.focus,
            );
            match built {
                Ok(widget) => {
                    self.registry.insert(id.clone(), widget);
                    if replacing {
                        report.replaced += 1;
                    } else {
                        report.created += 1;
                    }
                }
                Err(err) => {
                    warn!("Could not build marker for {}: {}", id, err);
                    report.failed.push((id.clone(), err));
                }
            }
        }

        debug!(
            "Snapshot {}: {} created, {} replaced, {} removed, {} unchanged, {} failed",
            snapshot.sequence(),
            report.created,
            report.replaced,
            report.removed,
            report.unchanged,
            report.failed.len()
        );
        report
    }

    /// Destroy every widget and stop accepting snapshots
    ///
    /// A widget failing to detach does not keep the others alive. Mounts are
    /// released once the teardown has returned.
    pub fn teardown(&mut self) -> TeardownReport {
        self.retired = true;
        let _pass = self.disposal.begin_pass();
        let mut report = TeardownReport::default();

        for (id, widget) in self.registry.drain(..).collect::<Vec<_>>() {
            if let Err(err) = widget.destroy(self.surface.as_ref(), &self.disposal) {
                warn!("Failed to detach marker {} during teardown: {}", id, err);
                report.failures += 1;
            }
            report.destroyed += 1;
        }

        if report.destroyed > 0 {
            info!(
                "Tore down {} marker(s), {} failure(s)",
                report.destroyed, report.failures
            );
        }
        report
    }

    /// Fire the click handler of a record's widget
    pub fn activate(&self, id: &RecordId) -> bool {
        self.registry
            .get(id)
            .map(|widget| widget.activation().fire())
            .unwrap_or(false)
    }

    pub fn widget(&self, id: &RecordId) -> Option<&ManagedWidget> {
        self.registry.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.registry.keys()
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.registry.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn disposal(&self) -> &DisposalQueue {
        &self.disposal
    }

    fn release(&self, id: &RecordId, widget: ManagedWidget) {
        if let Err(err) = widget.destroy(self.surface.as_ref(), &self.disposal) {
            warn!("Failed to detach marker {}: {}", id, err);
        }
    }
}

impl Drop for MarkerReconciler {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            self.teardown();
        }
    }
}
