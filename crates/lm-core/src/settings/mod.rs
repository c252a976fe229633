//! Synchronization settings
//!
//! Settings load from JSON. Every field has a default so a partial file only
//! overrides what it names.

use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Top level settings for a map synchronization session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Collection holding the records
    pub collection: String,

    /// Viewport fitting after each snapshot
    pub fit: FitSettings,

    /// Recentring when a marker is activated
    pub focus: FocusSettings,

    /// View shown before the first snapshot arrives
    pub initial_view: InitialView,
}

/// Screen padding around fitted bounds, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

impl Padding {
    pub fn uniform(value: f32) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }
}

/// Viewport fit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub padding: Padding,

    /// Zoom ceiling so single or clustered records do not over-zoom
    pub max_zoom: f64,

    pub duration_ms: u64,
}

/// Marker activation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusSettings {
    pub zoom: f64,
    pub duration_ms: u64,
}

/// Initial camera of the surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialView {
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            collection: "memories".to_string(),
            fit: FitSettings::default(),
            focus: FocusSettings::default(),
            initial_view: InitialView::default(),
        }
    }
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            padding: Padding::uniform(50.0),
            max_zoom: 15.0,
            duration_ms: 2000,
        }
    }
}

impl FitSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            zoom: 15.0,
            duration_ms: 1000,
        }
    }
}

impl FocusSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for InitialView {
    fn default() -> Self {
        // Paris
        Self {
            lat: 48.8534,
            lng: 2.3488,
            zoom: 12.0,
        }
    }
}

impl SyncSettings {
    /// Parse settings from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&text)?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }
}

/// Errors raised while loading settings
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}
