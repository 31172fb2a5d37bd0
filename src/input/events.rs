//! Input event types
//!
//! Platform-independent representation of the input events that feed the
//! display row's activity clock.

use std::time::Instant;

/// A key press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Linux key code
    pub code: u16,
    /// Pressed (true) or released (false)
    pub pressed: bool,
    /// When the event was captured
    pub timestamp: Instant,
}

/// A touch surface contact change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchEvent {
    /// Contact started (true) or ended (false)
    pub contact: bool,
    /// When the event was captured
    pub timestamp: Instant,
}

/// Union of input events from paired sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Touch(TouchEvent),
}

/// Which class of input produced a qualifying activity update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    /// Key press or release
    Key,
    /// Touch surface contact
    Touch,
    /// Host resume / explicit wake
    Wake,
}

/// Kind of paired input source, derived from capability bits
///
/// Sources are matched by what they can do, not by device identity: a
/// keyboard is anything carrying the Fn key, a touch surface anything
/// carrying the touch contact button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Keyboard,
    TouchSurface,
}

impl SourceKind {
    /// Classify a device from its key capability bits
    pub fn from_capabilities(has_fn_key: bool, has_touch: bool) -> Option<Self> {
        if has_fn_key {
            Some(SourceKind::Keyboard)
        } else if has_touch {
            Some(SourceKind::TouchSurface)
        } else {
            None
        }
    }
}

/// Linux key codes used by the display row and its paired sources
pub mod keycodes {
    pub const KEY_ESC: u16 = 1;
    pub const KEY_F1: u16 = 59;
    pub const KEY_F2: u16 = 60;
    pub const KEY_F3: u16 = 61;
    pub const KEY_F4: u16 = 62;
    pub const KEY_F5: u16 = 63;
    pub const KEY_F6: u16 = 64;
    pub const KEY_F7: u16 = 65;
    pub const KEY_F8: u16 = 66;
    pub const KEY_F9: u16 = 67;
    pub const KEY_F10: u16 = 68;
    pub const KEY_F11: u16 = 87;
    pub const KEY_F12: u16 = 88;

    pub const KEY_MUTE: u16 = 113;
    pub const KEY_VOLUMEDOWN: u16 = 114;
    pub const KEY_VOLUMEUP: u16 = 115;
    pub const KEY_POWER: u16 = 116;
    pub const KEY_EJECTCD: u16 = 161;
    pub const KEY_NEXTSONG: u16 = 163;
    pub const KEY_PLAYPAUSE: u16 = 164;
    pub const KEY_PREVIOUSSONG: u16 = 165;
    pub const KEY_KBDILLUMDOWN: u16 = 229;
    pub const KEY_KBDILLUMUP: u16 = 230;

    pub const BTN_TOUCH: u16 = 0x14a;
    pub const KEY_FN: u16 = 0x1d0;
}
