//! Report codec for the display row wire format
//!
//! Encodes mode-set and frame-write reports and decodes device-originated
//! reports. All reports are fixed-length; a caller-supplied payload of the
//! wrong size is rejected, never padded or truncated.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{
    Incoming, Mode, FRAME_PAYLOAD_LEN, FRAME_REPORT_ID, FRAME_REPORT_LEN, KEY_REPORT_ID,
    KEY_REPORT_LEN, MODE_REPORT_ID, MODE_REPORT_LEN,
};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame payload length mismatch: {0} bytes (expected: {1})")]
    PayloadLength(usize, usize),

    #[error("Truncated report: {0} bytes (report id {1:#04x} needs {2})")]
    Truncated(usize, u8, usize),

    #[error("Empty report")]
    Empty,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encode a mode-set report
pub fn encode_mode_set(mode: Mode) -> Bytes {
    let mut buf = BytesMut::with_capacity(MODE_REPORT_LEN);
    buf.put_u8(MODE_REPORT_ID);
    buf.put_u8(mode as u8);
    buf.freeze()
}

/// Decode a mode-set report back into a [`Mode`]
///
/// Used to verify emitted commands; returns `None` for anything that is not a
/// well-formed mode-set report.
pub fn decode_mode_set(report: &[u8]) -> Option<Mode> {
    if report.len() != MODE_REPORT_LEN || report[0] != MODE_REPORT_ID {
        return None;
    }
    Mode::from_wire(report[1])
}

/// Encode a frame-write report from an image payload
///
/// The payload must be exactly [`FRAME_PAYLOAD_LEN`] bytes; anything else is
/// a [`CodecError::PayloadLength`].
pub fn encode_frame(payload: &[u8]) -> CodecResult<Bytes> {
    if payload.len() != FRAME_PAYLOAD_LEN {
        return Err(CodecError::PayloadLength(payload.len(), FRAME_PAYLOAD_LEN));
    }

    let mut buf = BytesMut::with_capacity(FRAME_REPORT_LEN);
    buf.put_u8(FRAME_REPORT_ID);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Decode a device-originated report
///
/// Unknown report identifiers decode to [`Incoming::Unrecognized`] so the
/// owning read loop keeps running. A known identifier with too few bytes is
/// an error; the caller logs and drops it.
pub fn decode_incoming(report: &[u8]) -> CodecResult<Incoming> {
    let id = *report.first().ok_or(CodecError::Empty)?;

    match id {
        KEY_REPORT_ID => {
            if report.len() < KEY_REPORT_LEN {
                return Err(CodecError::Truncated(report.len(), id, KEY_REPORT_LEN));
            }
            let code = u16::from_le_bytes([report[1], report[2]]);
            let pressed = report[3] != 0;
            Ok(Incoming::Key { code, pressed })
        }
        _ => Ok(Incoming::Unrecognized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_set_roundtrip() {
        for mode in [Mode::Off, Mode::Active, Mode::Dimmed] {
            let report = encode_mode_set(mode);
            assert_eq!(report.len(), MODE_REPORT_LEN);
            assert_eq!(decode_mode_set(&report), Some(mode));
        }
    }

    #[test]
    fn test_mode_set_rejects_garbage() {
        assert_eq!(decode_mode_set(&[MODE_REPORT_ID, 0x7f]), None);
        assert_eq!(decode_mode_set(&[FRAME_REPORT_ID, 0x00]), None);
        assert_eq!(decode_mode_set(&[MODE_REPORT_ID]), None);
    }

    #[test]
    fn test_encode_frame() {
        let payload = [0xaau8; FRAME_PAYLOAD_LEN];
        let report = encode_frame(&payload).unwrap();

        assert_eq!(report.len(), FRAME_REPORT_LEN);
        assert_eq!(report[0], FRAME_REPORT_ID);
        assert_eq!(&report[1..], &payload[..]);
    }

    #[test]
    fn test_encode_frame_rejects_short_payload() {
        // 79 bytes where 80 are expected must fail, not be padded
        let short = [0u8; FRAME_PAYLOAD_LEN - 1];
        match encode_frame(&short) {
            Err(CodecError::PayloadLength(got, want)) => {
                assert_eq!(got, FRAME_PAYLOAD_LEN - 1);
                assert_eq!(want, FRAME_PAYLOAD_LEN);
            }
            other => panic!("expected PayloadLength error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_frame_rejects_long_payload() {
        let long = [0u8; FRAME_PAYLOAD_LEN + 1];
        assert!(encode_frame(&long).is_err());
    }

    #[test]
    fn test_decode_key_event() {
        let report = [KEY_REPORT_ID, 0x3b, 0x00, 0x01];
        match decode_incoming(&report).unwrap() {
            Incoming::Key { code, pressed } => {
                assert_eq!(code, 0x3b);
                assert!(pressed);
            }
            other => panic!("expected key event, got {:?}", other),
        }

        let release = [KEY_REPORT_ID, 0x3b, 0x00, 0x00];
        assert_eq!(
            decode_incoming(&release).unwrap(),
            Incoming::Key {
                code: 0x3b,
                pressed: false
            }
        );
    }

    #[test]
    fn test_decode_unknown_report_id() {
        // Unrelated device chatter decodes cleanly instead of erroring
        let report = [0x42, 0x01, 0x02, 0x03];
        assert_eq!(decode_incoming(&report).unwrap(), Incoming::Unrecognized);
    }

    #[test]
    fn test_decode_truncated_key_report() {
        let report = [KEY_REPORT_ID, 0x3b];
        assert!(matches!(
            decode_incoming(&report),
            Err(CodecError::Truncated(2, KEY_REPORT_ID, KEY_REPORT_LEN))
        ));
    }

    #[test]
    fn test_decode_empty_report() {
        assert!(matches!(decode_incoming(&[]), Err(CodecError::Empty)));
    }
}
