//! Built-in function row frame
//!
//! Only the function-key fallback image set is supported: one frame showing
//! the thirteen row slots, with icons picked by the current function key
//! mode. The payload layout is a layout byte, one icon id per slot, and
//! zero padding up to the fixed frame size.

use crate::config::FnMode;
use crate::input::remap::ROW_KEY_COUNT;
use crate::protocol::FRAME_PAYLOAD_LEN;

/// Layout id for the function row fallback frame
pub const LAYOUT_FN_ROW: u8 = 0x01;

const ICON_ESC: u8 = 0x10;
const ICON_F1: u8 = 0x20;

/// Icon ids for the special action layout, one per row slot
const SPECIAL_ICONS: [u8; ROW_KEY_COUNT] = [
    ICON_ESC, // esc
    0x30,     // backlight down
    0x31,     // backlight up
    0x32,     // mute
    0x33,     // volume down
    0x34,     // volume up
    0x35,     // previous track
    0x36,     // play/pause
    0x37,     // next track
    0x38,     // power
    0x39,     // eject
    0x32,     // mute
    ICON_ESC, // esc
];

/// Build the fallback frame payload for the given function key mode
pub fn fn_row_frame(fn_mode: FnMode) -> [u8; FRAME_PAYLOAD_LEN] {
    let mut payload = [0u8; FRAME_PAYLOAD_LEN];
    payload[0] = LAYOUT_FN_ROW;

    for slot in 0..ROW_KEY_COUNT {
        payload[1 + slot] = match fn_mode {
            // ESC keeps its icon, F1-F12 show numbered function key glyphs
            FnMode::FKeys => {
                if slot == 0 {
                    ICON_ESC
                } else {
                    ICON_F1 + (slot as u8 - 1)
                }
            }
            FnMode::Normal => SPECIAL_ICONS[slot],
        };
    }

    payload
}
