//! Mock HID transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{HidHandle, HidTransport, TransportError};

/// Mock transport for unit testing session logic.
///
/// Clones share state, so a test can keep one copy while the session owns
/// another.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued input reports (or read errors) returned in order.
    frames: Arc<Mutex<VecDeque<Result<Vec<u8>, TransportError>>>>,
    /// Captured feature reports.
    feature_reports: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Whether `open` succeeds.
    present: Arc<Mutex<bool>>,
    /// Whether `send_feature_report` fails.
    feature_report_error: Arc<Mutex<bool>>,
    /// Number of successful opens, for reconnect assertions.
    open_count: Arc<Mutex<usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::new())),
            feature_reports: Arc::new(Mutex::new(Vec::new())),
            present: Arc::new(Mutex::new(true)),
            feature_report_error: Arc::new(Mutex::new(false)),
            open_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Queue an input report to be returned on the next read.
    pub fn queue_frame(&self, frame: &[u8]) {
        self.frames.lock().unwrap().push_back(Ok(frame.to_vec()));
    }

    /// Queue a read error.
    pub fn queue_read_error(&self, err: TransportError) {
        self.frames.lock().unwrap().push_back(Err(err));
    }

    /// Simulate unplugging (open fails) or replugging the device.
    pub fn set_present(&self, present: bool) {
        *self.present.lock().unwrap() = present;
    }

    /// Make `send_feature_report` fail.
    pub fn set_feature_report_error(&self, fail: bool) {
        *self.feature_report_error.lock().unwrap() = fail;
    }

    /// Get all captured feature reports.
    pub fn feature_reports(&self) -> Vec<Vec<u8>> {
        self.feature_reports.lock().unwrap().clone()
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        *self.open_count.lock().unwrap()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HidTransport for MockTransport {
    type Handle = MockHandle;

    fn open(&self, vid: u16, pid: u16) -> Result<Self::Handle, TransportError> {
        if !*self.present.lock().unwrap() {
            return Err(TransportError::DeviceNotFound { vid, pid });
        }
        *self.open_count.lock().unwrap() += 1;
        Ok(MockHandle {
            transport: self.clone(),
        })
    }
}

/// Handle vended by [`MockTransport`]; shares its queues.
pub struct MockHandle {
    transport: MockTransport,
}

impl HidHandle for MockHandle {
    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        if *self.transport.feature_report_error.lock().unwrap() {
            return Err(TransportError::WriteFailed("mock failure".into()));
        }
        self.transport
            .feature_reports
            .lock()
            .unwrap()
            .push(data.to_vec());
        Ok(())
    }

    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let frame = self
            .transport
            .frames
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }))?;

        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }
}
