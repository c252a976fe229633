//! Core functionality for the memory map
//!
//! This crate provides the record model, the shared settings and the event
//! bus used by the synchronization layer.

pub mod events;
pub mod model;
pub mod settings;

use chrono::{DateTime, Utc};
use thiserror::Error;

// Re-export commonly used types
pub use events::{EventBus, Event, EventHandler, handler_from_fn};
pub use model::{
    DateRange, Emotion, GeoPoint, MediaKind, MediaRef, OwnerId, Record, RecordId, Snapshot,
};
pub use settings::{FitSettings, FocusSettings, InitialView, Padding, SettingsError, SyncSettings};

/// Errors raised while building model values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
