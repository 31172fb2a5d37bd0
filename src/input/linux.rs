//! Linux paired input sources
//!
//! Discovers the keyboard and touch surface paired with the display row by
//! their capability bits (KEY_FN / BTN_TOUCH) and streams their events into
//! the activity monitor channel.
//!
//! Requirements:
//! - User must be in the 'input' group or run as root

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;

use super::events::{
    keycodes::{BTN_TOUCH, KEY_FN},
    InputEvent, KeyEvent, SourceKind, TouchEvent,
};

// Linux input event constants
const EV_KEY: u16 = 0x01;

/// Poll slice for source reads; lets the reader notice a closed channel
const POLL_INTERVAL_MS: i32 = 200;

/// Raw input_event structure (matches Linux kernel structure)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct InputEventRaw {
    tv_sec: i64,
    tv_usec: i64,
    type_: u16,
    code: u16,
    value: i32,
}

const RAW_EVENT_SIZE: usize = std::mem::size_of::<InputEventRaw>();

impl InputEventRaw {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RAW_EVENT_SIZE {
            return None;
        }
        Some(Self {
            tv_sec: i64::from_ne_bytes(bytes[0..8].try_into().ok()?),
            tv_usec: i64::from_ne_bytes(bytes[8..16].try_into().ok()?),
            type_: u16::from_ne_bytes(bytes[16..18].try_into().ok()?),
            code: u16::from_ne_bytes(bytes[18..20].try_into().ok()?),
            value: i32::from_ne_bytes(bytes[20..24].try_into().ok()?),
        })
    }
}

/// Check a bit in a sysfs capability bitmap ("key" file contents)
///
/// The file holds space-separated hex words, most significant first; the
/// last word covers bits 0-63.
fn has_capability_bit(bitmap: &str, bit: u16) -> bool {
    let words: Vec<u64> = bitmap
        .split_whitespace()
        .filter_map(|w| u64::from_str_radix(w, 16).ok())
        .collect();

    let word_index = (bit / 64) as usize;
    if word_index >= words.len() {
        return false;
    }
    let word = words[words.len() - 1 - word_index];
    word & (1u64 << (bit % 64)) != 0
}

fn classify_device(event_name: &str) -> Option<SourceKind> {
    let caps_path = Path::new("/sys/class/input")
        .join(event_name)
        .join("device/capabilities/key");
    let bitmap = std::fs::read_to_string(caps_path).ok()?;

    SourceKind::from_capabilities(
        has_capability_bit(&bitmap, KEY_FN),
        has_capability_bit(&bitmap, BTN_TOUCH),
    )
}

/// Discover paired input sources under /dev/input
pub fn discover_sources() -> std::io::Result<Vec<(PathBuf, SourceKind)>> {
    let mut sources = Vec::new();
    let input_dir = Path::new("/dev/input");

    if !input_dir.exists() {
        return Ok(sources);
    }

    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if !name.starts_with("event") {
            continue;
        }
        if let Some(kind) = classify_device(&name) {
            tracing::debug!("paired source {:?} at {}", kind, entry.path().display());
            sources.push((entry.path(), kind));
        }
    }

    Ok(sources)
}

fn poll_readable(fd: i32, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if rc == 0 {
        return Ok(false);
    }
    if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "input source error or disconnect",
        ));
    }
    Ok(true)
}

/// Translate one raw event for the given source kind
fn translate(raw: &InputEventRaw, kind: SourceKind, timestamp: Instant) -> Option<InputEvent> {
    if raw.type_ != EV_KEY {
        return None;
    }

    match kind {
        SourceKind::Keyboard => Some(InputEvent::Key(KeyEvent {
            code: raw.code,
            pressed: raw.value != 0,
            timestamp,
        })),
        SourceKind::TouchSurface => {
            if raw.code != BTN_TOUCH {
                return None;
            }
            Some(InputEvent::Touch(TouchEvent {
                contact: raw.value != 0,
                timestamp,
            }))
        }
    }
}

fn source_loop(path: PathBuf, kind: SourceKind, tx: mpsc::Sender<InputEvent>) {
    let file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(&path)
    {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("cannot open input source {}: {}", path.display(), e);
            return;
        }
    };

    let mut buf = [0u8; RAW_EVENT_SIZE * 64];
    loop {
        if tx.is_closed() {
            return;
        }

        match poll_readable(file.as_raw_fd(), POLL_INTERVAL_MS) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!("input source {} lost: {}", path.display(), e);
                return;
            }
        }

        let n = match (&file as &File).read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                tracing::warn!("read error on {}: {}", path.display(), e);
                return;
            }
        };

        let now = Instant::now();
        for chunk in buf[..n].chunks_exact(RAW_EVENT_SIZE) {
            let Some(raw) = InputEventRaw::from_bytes(chunk) else {
                continue;
            };
            if let Some(event) = translate(&raw, kind, now) {
                // Drop on a full channel; only the latest activity matters
                let _ = tx.try_send(event);
            }
        }
    }
}

/// Spawn one reader per discovered source, feeding the monitor channel
///
/// Returns the kinds found; an empty list means no paired sources, which is
/// not an error (the row still works off device key echoes).
pub fn spawn_sources(tx: mpsc::Sender<InputEvent>) -> std::io::Result<Vec<SourceKind>> {
    let sources = discover_sources()?;
    let kinds: Vec<SourceKind> = sources.iter().map(|(_, k)| *k).collect();

    for (path, kind) in sources {
        let tx = tx.clone();
        tokio::task::spawn_blocking(move || source_loop(path, kind, tx));
    }

    Ok(kinds)
}
