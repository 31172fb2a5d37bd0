//! Mock transport for testing
//!
//! Records every written report and serves scripted incoming reports, so
//! session and state machine behavior can be tested without hardware. Writes
//! can be made to fail a fixed number of times to exercise the retry and
//! escalation paths.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

use super::{DeviceIdentity, Transport, TransportError, TransportResult};

#[derive(Default)]
struct MockState {
    written: Vec<Vec<u8>>,
    incoming: VecDeque<Vec<u8>>,
    fail_writes: usize,
    write_attempts: usize,
    closed: bool,
}

/// A scriptable in-memory transport
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    wakeup: Notify,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity reported for mock devices
    pub fn identity() -> DeviceIdentity {
        DeviceIdentity {
            vendor: crate::protocol::VENDOR_ID,
            product: crate::protocol::PRODUCT_ID,
            path: "mock".to_string(),
        }
    }

    /// Make the next `count` writes fail with an IO error
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().unwrap().fail_writes = count;
    }

    /// Queue a report to be returned by a future read
    pub fn push_incoming(&self, report: &[u8]) {
        self.state.lock().unwrap().incoming.push_back(report.to_vec());
        self.wakeup.notify_one();
    }

    /// Close the transport; further reads and writes fail
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.wakeup.notify_one();
    }

    /// All reports written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().written.clone()
    }

    /// Total write attempts, failed ones included
    pub fn write_attempts(&self) -> usize {
        self.state.lock().unwrap().write_attempts
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_report(&self, report: &[u8]) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.write_attempts += 1;

        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }

        state.written.push(report.to_vec());
        Ok(())
    }

    async fn read_report(&self, buf: &mut [u8]) -> TransportResult<usize> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(report) = state.incoming.pop_front() {
                    let n = report.len().min(buf.len());
                    buf[..n].copy_from_slice(&report[..n]);
                    return Ok(n);
                }
                if state.closed {
                    return Err(TransportError::Closed);
                }
            }
            self.wakeup.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_records_reports() {
        let mock = MockTransport::new();
        mock.write_report(&[0xb1, 0x01]).await.unwrap();

        assert_eq!(mock.written(), vec![vec![0xb1, 0x01]]);
        assert_eq!(mock.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_scripted_write_failures() {
        let mock = MockTransport::new();
        mock.fail_next_writes(1);

        assert!(mock.write_report(&[0xb1, 0x00]).await.is_err());
        mock.write_report(&[0xb1, 0x00]).await.unwrap();
        assert_eq!(mock.write_attempts(), 2);
        assert_eq!(mock.written().len(), 1);
    }

    #[tokio::test]
    async fn test_read_returns_queued_reports() {
        let mock = MockTransport::new();
        mock.push_incoming(&[0x01, 0x3b, 0x00, 0x01]);

        let mut buf = [0u8; 64];
        let n = mock.read_report(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x3b, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_read_fails_after_close() {
        let mock = MockTransport::new();
        mock.close();

        let mut buf = [0u8; 64];
        assert!(matches!(
            mock.read_report(&mut buf).await,
            Err(TransportError::Closed)
        ));
    }
}
