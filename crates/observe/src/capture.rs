//! Timeline capture without a custom observer.

use std::sync::{Arc, Mutex};

use crate::types::Timeline;

/// Receives the finalized timeline of a call.
///
/// Attach a clone to the call context; once the call returns, the timeline
/// is available here. Cheap to clone and thread-safe; the engine stores into
/// it exactly once, at finalization.
#[derive(Clone, Default)]
pub struct TimelineCapture {
    slot: Arc<Mutex<Option<Timeline>>>,
}

impl TimelineCapture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// The captured timeline. `None` until a call carrying this capture has
    /// finalized.
    pub fn timeline(&self) -> Option<Timeline> {
        self.slot.lock().expect("timeline capture lock poisoned").clone()
    }

    /// Store a finalized timeline. Called by the engine; the last store wins
    /// when the same capture is reused across calls.
    pub fn store(&self, timeline: Timeline) {
        *self.slot.lock().expect("timeline capture lock poisoned") = Some(timeline);
    }
}

impl std::fmt::Debug for TimelineCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let captured = self
            .slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("TimelineCapture")
            .field("captured", &captured)
            .finish()
    }
}
