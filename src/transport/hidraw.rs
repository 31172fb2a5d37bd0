//! hidraw-backed transport
//!
//! The kernel HID layer is the demultiplexer here: it exposes the display
//! row as a hidraw character device. Discovery walks /sys/class/hidraw and
//! matches the vendor/product pair; I/O is blocking-with-poll on a dedicated
//! blocking task so a stalled device never wedges the runtime.

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{DeviceIdentity, Transport, TransportError, TransportResult};
use crate::protocol::{PRODUCT_ID, VENDOR_ID};

/// Poll slice for reads; keeps the blocking task cancellable
const POLL_INTERVAL_MS: i32 = 100;

/// Transport over an open hidraw device node
pub struct HidrawTransport {
    file: Arc<File>,
    identity: DeviceIdentity,
}

impl HidrawTransport {
    /// Open a hidraw device node in nonblocking mode
    pub fn open(path: &Path) -> TransportResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)?;

        Ok(Self {
            file: Arc::new(file),
            identity: DeviceIdentity {
                vendor: VENDOR_ID,
                product: PRODUCT_ID,
                path: path.display().to_string(),
            },
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}

fn poll_fd(fd: i32, events: libc::c_short, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
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
            "device error or disconnect",
        ));
    }

    Ok(pfd.revents & events != 0)
}

#[async_trait]
impl Transport for HidrawTransport {
    async fn write_report(&self, report: &[u8]) -> TransportResult<()> {
        let file = self.file.clone();
        let report = report.to_vec();

        tokio::task::spawn_blocking(move || -> TransportResult<()> {
            let mut f: &File = &file;
            loop {
                match f.write(&report) {
                    Ok(n) if n == report.len() => return Ok(()),
                    Ok(_) => {
                        return Err(TransportError::Io(std::io::Error::new(
                            std::io::ErrorKind::WriteZero,
                            "short report write",
                        )))
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        poll_fd(file.as_raw_fd(), libc::POLLOUT, POLL_INTERVAL_MS)?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        })
        .await
        .map_err(|_| TransportError::Closed)?
    }

    async fn read_report(&self, buf: &mut [u8]) -> TransportResult<usize> {
        let len = buf.len();

        loop {
            let file = self.file.clone();
            let report = tokio::task::spawn_blocking(move || -> TransportResult<Option<Vec<u8>>> {
                if !poll_fd(file.as_raw_fd(), libc::POLLIN, POLL_INTERVAL_MS)? {
                    return Ok(None);
                }

                let mut tmp = vec![0u8; len];
                let mut f: &File = &file;
                match f.read(&mut tmp) {
                    Ok(0) => Err(TransportError::Closed),
                    Ok(n) => {
                        tmp.truncate(n);
                        Ok(Some(tmp))
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(|_| TransportError::Closed)??;

            if let Some(report) = report {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                return Ok(n);
            }
        }
    }
}

/// Look for the display row endpoint among the hidraw devices
///
/// Returns `Ok(None)` while the device is absent; callers poll periodically.
pub fn discover() -> TransportResult<Option<HidrawTransport>> {
    let class_dir = Path::new("/sys/class/hidraw");
    if !class_dir.exists() {
        return Ok(None);
    }

    for entry in std::fs::read_dir(class_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let uevent = entry.path().join("device/uevent");

        let Ok(contents) = std::fs::read_to_string(&uevent) else {
            continue;
        };

        if let Some((vendor, product)) = parse_hid_id(&contents) {
            if vendor == VENDOR_ID && product == PRODUCT_ID {
                let dev = PathBuf::from("/dev").join(&name);
                tracing::debug!("found display row endpoint at {}", dev.display());
                return Ok(Some(HidrawTransport::open(&dev)?));
            }
        }
    }

    Ok(None)
}

/// Parse the vendor/product pair out of a hidraw uevent's HID_ID line
/// (`HID_ID=0003:000005AC:00008600`)
fn parse_hid_id(uevent: &str) -> Option<(u16, u16)> {
    for line in uevent.lines() {
        if let Some(rest) = line.strip_prefix("HID_ID=") {
            let mut parts = rest.split(':');
            let _bus = parts.next()?;
            let vendor = u32::from_str_radix(parts.next()?, 16).ok()?;
            let product = u32::from_str_radix(parts.next()?, 16).ok()?;
            return Some((vendor as u16, product as u16));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hid_id() {
        let uevent = "DRIVER=hid-generic\nHID_ID=0003:000005AC:00008600\nHID_NAME=Apple T1\n";
        assert_eq!(parse_hid_id(uevent), Some((0x05ac, 0x8600)));
    }

    #[test]
    fn test_parse_hid_id_missing() {
        assert_eq!(parse_hid_id("DRIVER=hid-generic\n"), None);
        assert_eq!(parse_hid_id("HID_ID=0003:garbage:0001\n"), None);
    }
}
