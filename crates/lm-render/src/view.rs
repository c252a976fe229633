use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use lm_core::{Emotion, MediaKind, Record, RecordId};

/// Click handler of a marker
///
/// The handler can be disarmed; a disarmed handler never runs its action
/// again, even through clones held by the renderer.
#[derive(Clone)]
pub struct ActivationHandle {
    armed: Arc<AtomicBool>,
    action: Arc<dyn Fn() + Send + Sync>,
}

impl ActivationHandle {
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(true)),
            action: Arc::new(action),
        }
    }

    /// Run the action if still armed
    pub fn fire(&self) -> bool {
        if self.armed.load(Ordering::SeqCst) {
            (self.action)();
            true
        } else {
            false
        }
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ActivationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationHandle")
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Content of one marker
#[derive(Debug, Clone)]
pub struct MarkerView {
    pub record_id: RecordId,
    pub label: String,
    pub place_name: String,
    pub emotion: Emotion,
    pub glyph: &'static str,
    pub accent: [u8; 4],
    pub image_count: usize,
    pub video_count: usize,
    pub on_activate: ActivationHandle,
}

impl MarkerView {
    pub fn from_record(record: &Record, on_activate: ActivationHandle) -> Self {
        Self {
            record_id: record.id.clone(),
            label: record.label.clone(),
            place_name: record.place_name.clone(),
            emotion: record.emotion,
            glyph: record.emotion.glyph(),
            accent: record.emotion.accent_color(),
            image_count: record.media_count(MediaKind::Image),
            video_count: record.media_count(MediaKind::Video),
            on_activate,
        }
    }

    /// Whether the media badge is shown
    pub fn has_media(&self) -> bool {
        self.image_count + self.video_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_disarmed_clone_does_not_fire() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handle = ActivationHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let held_by_renderer = handle.clone();

        assert!(held_by_renderer.fire());
        handle.disarm();
        assert!(!held_by_renderer.fire());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
