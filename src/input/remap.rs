//! Key remapping between function-key and special-action semantics
//!
//! The display row carries thirteen physical positions (ESC, F1-F12). Each
//! position has two meanings: a raw function key and a special action
//! (brightness, volume, media, power). Which one a press produces depends on
//! the configured default mode, inverted for a single event while the Fn
//! modifier is held.
//!
//! This sits in the input hot path: no allocation, no blocking.

use crate::config::FnMode;

use super::events::keycodes::*;

/// Number of physical positions on the row (ESC, F1-F12)
pub const ROW_KEY_COUNT: usize = 13;

/// Row position to function key code
const FN_KEYS: [u16; ROW_KEY_COUNT] = [
    KEY_ESC, KEY_F1, KEY_F2, KEY_F3, KEY_F4, KEY_F5, KEY_F6, KEY_F7, KEY_F8, KEY_F9, KEY_F10,
    KEY_F11, KEY_F12,
];

/// Row position to special action code
const SPECIAL_KEYS: [u16; ROW_KEY_COUNT] = [
    KEY_ESC,
    KEY_KBDILLUMDOWN,
    KEY_KBDILLUMUP,
    KEY_MUTE,
    KEY_VOLUMEDOWN,
    KEY_VOLUMEUP,
    KEY_PREVIOUSSONG,
    KEY_PLAYPAUSE,
    KEY_NEXTSONG,
    KEY_POWER,
    KEY_EJECTCD,
    KEY_MUTE,
    KEY_ESC,
];

/// The logical result of remapping one physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalAction {
    /// A row key, remapped through one of the two tables
    Key(u16),
    /// A code the row does not handle, forwarded unchanged
    PassThrough(u16),
}

impl LogicalAction {
    /// The key code this action produces
    pub fn code(&self) -> u16 {
        match self {
            LogicalAction::Key(code) | LogicalAction::PassThrough(code) => *code,
        }
    }
}

/// Map a function key code to its row position
fn row_position(code: u16) -> Option<usize> {
    match code {
        KEY_ESC => Some(0),
        KEY_F1..=KEY_F10 => Some((code - KEY_F1) as usize + 1),
        KEY_F11 => Some(11),
        KEY_F12 => Some(12),
        _ => None,
    }
}

/// Remap a physical key code to its logical action
///
/// Pure and total: every code yields exactly one action. With
/// `FnMode::FKeys` the row produces function keys, holding Fn inverts to the
/// special table for that event; with `FnMode::Normal` the defaults are
/// swapped.
pub fn remap(code: u16, fn_mode: FnMode, fn_held: bool) -> LogicalAction {
    let Some(position) = row_position(code) else {
        return LogicalAction::PassThrough(code);
    };

    let want_fn_key = (fn_mode == FnMode::FKeys) != fn_held;
    if want_fn_key {
        LogicalAction::Key(FN_KEYS[position])
    } else {
        LogicalAction::Key(SPECIAL_KEYS[position])
    }
}
