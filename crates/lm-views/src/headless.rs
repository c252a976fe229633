//! Surface without a display
//!
//! Tracks markers and camera moves in memory. Used by the demo binary and by
//! tests.

use std::sync::Arc;
use ahash::{AHashMap, AHashSet};
use lm_core::{GeoPoint, InitialView};
use lm_render::MountNode;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::surface::{Anchor, FitRequest, FlyTo, MarkerHandle, SurfaceError, VisualSurface};

/// Camera position of a headless surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone)]
struct PlacedMarker {
    position: GeoPoint,
    node_id: Uuid,
}

struct SurfaceState {
    camera: Camera,
    markers: AHashMap<MarkerHandle, PlacedMarker>,
    next_handle: u64,
    added: usize,
    removed: usize,
    fits: Vec<FitRequest>,
    flights: Vec<FlyTo>,
    failing_removals: AHashSet<MarkerHandle>,
    reject_all: bool,
    disposed: bool,
}

/// Surface recording markers and camera animations
#[derive(Clone)]
pub struct HeadlessSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl HeadlessSurface {
    pub fn new(initial: &InitialView) -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                camera: Camera {
                    lat: initial.lat,
                    lng: initial.lng,
                    zoom: initial.zoom,
                },
                markers: AHashMap::new(),
                next_handle: 1,
                added: 0,
                removed: 0,
                fits: Vec::new(),
                flights: Vec::new(),
                failing_removals: AHashSet::new(),
                reject_all: false,
                disposed: false,
            })),
        }
    }

    pub fn camera(&self) -> Camera {
        self.state.lock().camera
    }

    /// Markers currently on the surface
    pub fn marker_count(&self) -> usize {
        self.state.lock().markers.len()
    }

    pub fn added_count(&self) -> usize {
        self.state.lock().added
    }

    pub fn removed_count(&self) -> usize {
        self.state.lock().removed
    }

    /// Nodes currently placed at a position
    pub fn nodes_at(&self, position: GeoPoint) -> Vec<Uuid> {
        self.state
            .lock()
            .markers
            .values()
            .filter(|m| m.position == position)
            .map(|m| m.node_id)
            .collect()
    }

    pub fn fits(&self) -> Vec<FitRequest> {
        self.state.lock().fits.clone()
    }

    pub fn flights(&self) -> Vec<FlyTo> {
        self.state.lock().flights.clone()
    }

    /// Make removal of a marker fail once; the marker is dropped anyway
    pub fn fail_removal_of(&self, handle: MarkerHandle) {
        self.state.lock().failing_removals.insert(handle);
    }

    /// Reject every new marker
    pub fn set_reject_markers(&self, reject: bool) {
        self.state.lock().reject_all = reject;
    }

    /// Tear the surface down; later calls fail with `Disposed`
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        state.markers.clear();
    }
}

impl VisualSurface for HeadlessSurface {
    fn add_marker(
        &self,
        position: GeoPoint,
        node: &MountNode,
        anchor: Anchor,
    ) -> Result<MarkerHandle, SurfaceError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SurfaceError::Disposed);
        }
        if state.reject_all {
            return Err(SurfaceError::MarkerRejected(format!("node {}", node.id)));
        }

        let handle = MarkerHandle(state.next_handle);
        state.next_handle += 1;
        state.added += 1;
        state.markers.insert(
            handle,
            PlacedMarker {
                position,
                node_id: node.id,
            },
        );
        debug!(
            "Placed {} at ({:.4}, {:.4}) anchored {:?}",
            handle,
            position.lat(),
            position.lng(),
            anchor
        );
        Ok(handle)
    }

    fn remove_marker(&self, handle: MarkerHandle) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SurfaceError::Disposed);
        }

        let known = state.markers.remove(&handle).is_some();
        state.removed += 1;
        if state.failing_removals.remove(&handle) {
            return Err(SurfaceError::MarkerRejected(format!("{} refused to detach", handle)));
        }
        if !known {
            return Err(SurfaceError::UnknownMarker(handle));
        }
        Ok(())
    }

    fn fit_bounds(&self, request: FitRequest) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SurfaceError::Disposed);
        }

        let center = request.bounds.center();
        let span = request.bounds.width().max(request.bounds.height());
        // Whole world at zoom 0, halving per level
        let zoom = if span > 0.0 {
            (360.0 / span).log2().max(0.0)
        } else {
            f64::INFINITY
        };

        state.camera = Camera {
            lat: center.y,
            lng: center.x,
            zoom: zoom.min(request.max_zoom),
        };
        info!(
            "Fitting viewport to ({:.4}, {:.4})..({:.4}, {:.4}), zoom {:.2}",
            request.bounds.min().y,
            request.bounds.min().x,
            request.bounds.max().y,
            request.bounds.max().x,
            state.camera.zoom
        );
        state.fits.push(request);
        Ok(())
    }

    fn fly_to(&self, request: FlyTo) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SurfaceError::Disposed);
        }

        state.camera = Camera {
            lat: request.center.lat(),
            lng: request.center.lng(),
            zoom: request.zoom,
        };
        state.flights.push(request);
        Ok(())
    }
}
