//! Protocol module - Defines the fixed-format HID reports exchanged with the
//! display row device
//!
//! Every report starts with a one-byte report identifier:
//! - `0xB0` frame write: 80 bytes of image payload for the row
//! - `0xB1` mode set: 1 byte selecting Off/Active/Dimmed
//! - `0x01` key event: 2 bytes key code (little-endian) + 1 byte press state
//!
//! Report lengths are fixed per identifier; there is no length field on the
//! wire.

mod codec;

pub use codec::*;

/// USB vendor id of the iBridge controller behind the display row
pub const VENDOR_ID: u16 = 0x05ac;

/// USB product id of the T1 iBridge controller
pub const PRODUCT_ID: u16 = 0x8600;

/// Report identifier for frame writes
pub const FRAME_REPORT_ID: u8 = 0xB0;

/// Total frame report length on the wire, identifier included
pub const FRAME_REPORT_LEN: usize = 81;

/// Image payload carried by one frame report
pub const FRAME_PAYLOAD_LEN: usize = FRAME_REPORT_LEN - 1;

/// Report identifier for mode-set commands
pub const MODE_REPORT_ID: u8 = 0xB1;

/// Total mode-set report length on the wire
pub const MODE_REPORT_LEN: usize = 2;

/// Report identifier for device-originated key events
pub const KEY_REPORT_ID: u8 = 0x01;

/// Total key event report length on the wire
pub const KEY_REPORT_LEN: usize = 4;

/// Display mode of the row
///
/// The discriminants are the wire encoding used by mode-set reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Backlight off, no frame driven
    Off = 0x00,
    /// Full brightness, current frame shown
    Active = 0x01,
    /// Reduced brightness, same frame
    Dimmed = 0x02,
}

impl Mode {
    /// Decode a wire mode byte
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Mode::Off),
            0x01 => Some(Mode::Active),
            0x02 => Some(Mode::Dimmed),
            _ => None,
        }
    }
}

/// A report received from the device, after decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A key press or release on the row
    Key {
        /// Physical key code reported by the device
        code: u16,
        /// Pressed (true) or released (false)
        pressed: bool,
    },
    /// A report with an identifier this daemon does not interpret
    ///
    /// Unrelated device chatter must not disturb the read loop, so this is a
    /// value, not an error.
    Unrecognized,
}
