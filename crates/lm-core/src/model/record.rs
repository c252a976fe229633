//! Geotagged memory records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GeoPoint, OwnerId, RecordId};

/// Emotion attached to a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Excited,
    Peaceful,
    Nostalgic,
}

impl Emotion {
    /// Glyph shown inside the marker
    pub fn glyph(&self) -> &'static str {
        match self {
            Emotion::Happy => "😊",
            Emotion::Sad => "😢",
            Emotion::Excited => "🎉",
            Emotion::Peaceful => "😌",
            Emotion::Nostalgic => "🥺",
        }
    }

    /// Accent colour of the marker (RGBA)
    pub fn accent_color(&self) -> [u8; 4] {
        match self {
            Emotion::Happy => [234, 179, 8, 255],      // Yellow
            Emotion::Sad => [107, 114, 128, 255],      // Gray
            Emotion::Excited => [236, 72, 153, 255],   // Pink
            Emotion::Peaceful => [59, 130, 246, 255],  // Blue
            Emotion::Nostalgic => [168, 85, 247, 255], // Purple
        }
    }
}

/// Kind of attached media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Reference to an uploaded photo or video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub url: String,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
}

/// A single geotagged memory
///
/// Records are never mutated in place. A change arrives as a new value with
/// the same `id`, so value equality tells whether two versions render alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub owner: OwnerId,
    pub position: GeoPoint,
    #[serde(default)]
    pub place_name: String,
    pub label: String,
    pub emotion: Emotion,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(
        id: impl Into<RecordId>,
        owner: impl Into<OwnerId>,
        position: GeoPoint,
        label: impl Into<String>,
        emotion: Emotion,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            position,
            place_name: String::new(),
            label: label.into(),
            emotion,
            media: Vec::new(),
            timestamp,
        }
    }

    pub fn with_place_name(mut self, place_name: impl Into<String>) -> Self {
        self.place_name = place_name.into();
        self
    }

    pub fn with_media(mut self, media: Vec<MediaRef>) -> Self {
        self.media = media;
        self
    }

    /// Count attached media of the given kind
    pub fn media_count(&self, kind: MediaKind) -> usize {
        self.media.iter().filter(|m| m.kind == kind).count()
    }
}
