//! Visual surface abstraction - the map the markers live on

use std::fmt;
use std::time::Duration;
use geo_types::{Coord, Rect};
use lm_core::{GeoPoint, Padding};
use lm_render::MountNode;
use thiserror::Error;

/// Handle of a marker placed on a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerHandle(pub u64);

impl fmt::Display for MarkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// Which point of the marker node sits on the position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Center,
    Bottom,
}

/// Animated move to a region
#[derive(Debug, Clone, PartialEq)]
pub struct FitRequest {
    /// x = longitude, y = latitude
    pub bounds: Rect<f64>,
    pub padding: Padding,
    pub max_zoom: f64,
    pub duration: Duration,
}

impl FitRequest {
    pub fn south_west(&self) -> Coord<f64> {
        self.bounds.min()
    }

    pub fn north_east(&self) -> Coord<f64> {
        self.bounds.max()
    }
}

/// Animated recentring on a point
#[derive(Debug, Clone, PartialEq)]
pub struct FlyTo {
    pub center: GeoPoint,
    pub zoom: f64,
    pub duration: Duration,
}

/// Errors raised by surfaces
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Marker rejected: {0}")]
    MarkerRejected(String),

    #[error("Unknown marker: {0}")]
    UnknownMarker(MarkerHandle),

    #[error("Surface has been disposed")]
    Disposed,
}

/// Trait for map surfaces
pub trait VisualSurface: Send + Sync {
    /// Place a marker showing `node` at `position`
    fn add_marker(
        &self,
        position: GeoPoint,
        node: &MountNode,
        anchor: Anchor,
    ) -> Result<MarkerHandle, SurfaceError>;

    /// Detach a marker
    fn remove_marker(&self, handle: MarkerHandle) -> Result<(), SurfaceError>;

    /// Animate to contain a region
    fn fit_bounds(&self, request: FitRequest) -> Result<(), SurfaceError>;

    /// Animate to a point
    fn fly_to(&self, request: FlyTo) -> Result<(), SurfaceError>;
}
