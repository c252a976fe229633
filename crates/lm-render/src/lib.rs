//! Rendering abstraction layer
//!
//! Marker content is mounted into detached nodes by a [`Renderer`]. Mounts
//! are released later through a [`DisposalQueue`], never inline.

mod disposal;
pub mod headless;
mod view;

use thiserror::Error;
use uuid::Uuid;

pub use disposal::{DisposalQueue, DisposalStats, PassGuard};
pub use headless::HeadlessRenderer;
pub use view::{ActivationHandle, MarkerView};

/// Errors raised by renderers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Mount failed: {0}")]
    MountFailed(String),

    #[error("Unmount failed: {0}")]
    UnmountFailed(String),
}

/// A detached node that marker content is mounted into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountNode {
    pub id: Uuid,
    pub class: String,
}

impl MountNode {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            class: class.into(),
        }
    }
}

/// Trait for renderers
pub trait Renderer: Send + Sync {
    /// Mount a marker view into a detached node
    fn mount(
        &self,
        node: &MountNode,
        view: MarkerView,
    ) -> Result<Box<dyn MountedView>, RenderError>;
}

/// A live mount; must eventually be unmounted exactly once
pub trait MountedView: Send {
    /// Node the view is mounted in
    fn node_id(&self) -> Uuid;

    /// Release the mount
    fn unmount(self: Box<Self>) -> Result<(), RenderError>;
}
