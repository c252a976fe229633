//! Per-record marker widgets

use std::sync::Arc;
use lm_core::{FocusSettings, Record};
use lm_render::{
    ActivationHandle, DisposalQueue, MarkerView, MountNode, MountedView, RenderError, Renderer,
};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::surface::{Anchor, FlyTo, MarkerHandle, SurfaceError, VisualSurface};

/// Class of the node markers are mounted into
const MARKER_CLASS: &str = "memory-marker";

/// Errors raised while building a widget
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WidgetError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Marker, mount and click handler owned for one record
pub struct ManagedWidget {
    record: Record,
    node: MountNode,
    marker: MarkerHandle,
    mount: Box<dyn MountedView>,
    activation: ActivationHandle,
}

impl ManagedWidget {
    /// Mount the record's view and anchor it on the surface
    pub(crate) fn build(
        record: &Record,
        surface: &Arc<dyn VisualSurface>,
        renderer: &dyn Renderer,
        disposal: &DisposalQueue,
        focus: &FocusSettings,
    ) -> Result<Self, WidgetError> {
        let node = MountNode::new(MARKER_CLASS);
        let activation = focus_handler(record, surface, focus);

        let mount = renderer.mount(&node, MarkerView::from_record(record, activation.clone()))?;

        let marker = match surface.add_marker(record.position, &node, Anchor::Center) {
            Ok(marker) => marker,
            Err(err) => {
                activation.disarm();
                disposal.schedule(mount);
                return Err(err.into());
            }
        };

        Ok(Self {
            record: record.clone(),
            node,
            marker,
            mount,
            activation,
        })
    }

    /// Release the widget
    ///
    /// The handler is disarmed and the mount queued for release whatever
    /// happens; a failed marker detach is returned for reporting only.
    pub(crate) fn destroy(
        self,
        surface: &dyn VisualSurface,
        disposal: &DisposalQueue,
    ) -> Result<(), SurfaceError> {
        self.activation.disarm();
        let detached = surface.remove_marker(self.marker);
        disposal.schedule(self.mount);
        detached
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn marker(&self) -> MarkerHandle {
        self.marker
    }

    pub fn node_id(&self) -> Uuid {
        self.node.id
    }

    pub fn activation(&self) -> &ActivationHandle {
        &self.activation
    }
}

/// Click handler recentring the surface on the record
///
/// Captures the record position as it is now; a replaced record gets a new
/// handler and this one is disarmed.
fn focus_handler(
    record: &Record,
    surface: &Arc<dyn VisualSurface>,
    focus: &FocusSettings,
) -> ActivationHandle {
    let surface = surface.clone();
    let id = record.id.clone();
    let request = FlyTo {
        center: record.position,
        zoom: focus.zoom,
        duration: focus.duration(),
    };

    ActivationHandle::new(move || {
        if let Err(err) = surface.fly_to(request.clone()) {
            warn!("Could not focus marker {}: {}", id, err);
        }
    })
}
