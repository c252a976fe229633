//! Viewport fitting - frames all records of a snapshot

use std::sync::Arc;
use geo_types::{coord, Rect};
use lm_core::{FitSettings, Snapshot};
use tracing::{trace, warn};

use crate::surface::{FitRequest, VisualSurface};

/// Smallest rectangle containing every record position (x = lng, y = lat)
pub fn bounds_of(snapshot: &Snapshot) -> Option<Rect<f64>> {
    let mut positions = snapshot.iter().map(|r| r.position);
    let first = positions.next()?;

    let (mut min_lng, mut min_lat) = (first.lng(), first.lat());
    let (mut max_lng, mut max_lat) = (min_lng, min_lat);
    for p in positions {
        min_lng = min_lng.min(p.lng());
        max_lng = max_lng.max(p.lng());
        min_lat = min_lat.min(p.lat());
        max_lat = max_lat.max(p.lat());
    }

    Some(Rect::new(
        coord! { x: min_lng, y: min_lat },
        coord! { x: max_lng, y: max_lat },
    ))
}

/// Requests a region fit once per snapshot
pub struct ViewportFitter {
    surface: Arc<dyn VisualSurface>,
    settings: FitSettings,
}

impl ViewportFitter {
    pub fn new(surface: Arc<dyn VisualSurface>, settings: FitSettings) -> Self {
        Self { surface, settings }
    }

    /// Frame the snapshot; returns the request issued, if any
    pub fn fit(&self, snapshot: &Snapshot) -> Option<FitRequest> {
        let Some(bounds) = bounds_of(snapshot) else {
            trace!("Empty snapshot {}, keeping viewport", snapshot.sequence());
            return None;
        };

        let request = FitRequest {
            bounds,
            padding: self.settings.padding,
            max_zoom: self.settings.max_zoom,
            duration: self.settings.duration(),
        };

        if let Err(err) = self.surface.fit_bounds(request.clone()) {
            warn!("Viewport fit for snapshot {} failed: {}", snapshot.sequence(), err);
        }
        Some(request)
    }
}
