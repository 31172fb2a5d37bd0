//! Activity monitor
//!
//! Consumes raw input events from the paired sources and feeds the display
//! state machine's activity clock. Updates are applied inline, one event at
//! a time: only the most recent timestamp matters, so bursts never queue
//! work beyond the channel they arrive on. Also tracks the Fn modifier for
//! the remap path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::events::{keycodes::KEY_FN, ActivitySource, InputEvent};
use crate::display::{DisplayState, Emission};

/// Watches input events and drives the activity clock
pub struct ActivityMonitor {
    display: Arc<DisplayState>,
    fn_held: Arc<AtomicBool>,
}

impl ActivityMonitor {
    pub fn new(display: Arc<DisplayState>, fn_held: Arc<AtomicBool>) -> Self {
        Self { display, fn_held }
    }

    /// Whether the Fn modifier is currently held on the paired keyboard
    pub fn fn_held(&self) -> bool {
        self.fn_held.load(Ordering::SeqCst)
    }

    /// Apply one input event, returning any device commands it produced
    ///
    /// Key and touch events qualify as activity; device presence polling
    /// never reaches this path.
    pub fn handle_event(&self, event: &InputEvent) -> Emission {
        match event {
            InputEvent::Key(key) => {
                if key.code == KEY_FN {
                    self.fn_held.store(key.pressed, Ordering::SeqCst);
                }
                self.display
                    .record_activity(ActivitySource::Key, key.timestamp)
            }
            InputEvent::Touch(touch) => self
                .display
                .record_activity(ActivitySource::Touch, touch.timestamp),
        }
    }
}
