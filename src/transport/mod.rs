//! Transport module - the channel to the physical device
//!
//! The core never opens the bus itself: an external demultiplexer (hidraw on
//! Linux) presents the display row as an already-open duplex channel. The
//! [`Transport`] trait is that capability; everything above it is testable
//! against [`MockTransport`].

#[cfg(test)]
mod mock;

#[cfg(target_os = "linux")]
mod hidraw;

#[cfg(test)]
pub use mock::MockTransport;

#[cfg(target_os = "linux")]
pub use hidraw::{discover, HidrawTransport};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,

    #[error("No device attached")]
    NoDevice,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// An open bidirectional report channel to the display row
///
/// Writes accept one full report atomically; reads return one report at a
/// time, framed by its report identifier. Implementations must be safe for
/// one writer and one reader at a time; serializing writers is the caller's
/// job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one complete report
    async fn write_report(&self, report: &[u8]) -> TransportResult<()>;

    /// Read one report into `buf`, returning its length
    async fn read_report(&self, buf: &mut [u8]) -> TransportResult<usize>;
}

/// Identity of the physical device behind a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor: u16,
    pub product: u16,
    /// Where the endpoint came from (device node path, or "mock")
    pub path: String,
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} ({})",
            self.vendor, self.product, self.path
        )
    }
}

/// Owns the transport for one attached device
///
/// Exactly one handle exists per physical device; it is dropped on detach
/// and a fresh one is built on reattach. Its existence implies the transport
/// is open.
pub struct DeviceHandle {
    transport: std::sync::Arc<dyn Transport>,
    identity: DeviceIdentity,
}

impl DeviceHandle {
    pub fn new(transport: std::sync::Arc<dyn Transport>, identity: DeviceIdentity) -> Self {
        Self {
            transport,
            identity,
        }
    }

    pub fn transport(&self) -> std::sync::Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }
}
