//! Map views for the memory map
//!
//! The [`MarkerReconciler`] keeps one marker widget per visible record on a
//! [`VisualSurface`], and the [`ViewportFitter`] frames the records after each
//! snapshot.

pub mod headless;
mod reconciler;
mod surface;
mod viewport;
mod widget;

pub use headless::{Camera, HeadlessSurface};
pub use reconciler::{MarkerReconciler, ReconcileReport, TeardownReport};
pub use surface::{Anchor, FitRequest, FlyTo, MarkerHandle, SurfaceError, VisualSurface};
pub use viewport::{bounds_of, ViewportFitter};
pub use widget::{ManagedWidget, WidgetError};
