//! hidapi-based transport implementation.

use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::{debug, info};

use super::traits::{HidHandle, HidTransport, TransportError};

/// hidapi-backed transport.
pub struct HidApiTransport {
    api: HidApi,
}

impl HidApiTransport {
    /// Initialize the hidapi context.
    pub fn new() -> Result<Self, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        Ok(Self { api })
    }
}

impl HidTransport for HidApiTransport {
    type Handle = HidApiHandle;

    fn open(&self, vid: u16, pid: u16) -> Result<Self::Handle, TransportError> {
        let device = self
            .api
            .open(vid, pid)
            .map_err(|_| TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vid = %format!("{:04X}", vid),
            pid = %format!("{:04X}", pid),
            "Device opened"
        );

        Ok(HidApiHandle { device })
    }
}

/// An open hidapi device.
pub struct HidApiHandle {
    device: HidDevice,
}

impl HidHandle for HidApiHandle {
    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        self.device
            .send_feature_report(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let n = self
            .device
            .read_timeout(buf, timeout_ms)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        // hidapi signals a timeout as a zero-byte read.
        if n == 0 {
            return Err(TransportError::Timeout {
                timeout_ms: timeout_ms as u64,
            });
        }

        debug!(bytes_read = n, "Read complete");
        Ok(n)
    }
}
