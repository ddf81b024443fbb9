//! HID transport layer abstraction.
//!
//! Defines the `HidTransport` and `HidHandle` traits for sensor
//! communication, allowing different implementations (hidapi, mock).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Abstract HID transport: opens device handles by vendor/product id.
///
/// This trait enables:
/// - Production implementation using hidapi
/// - Mock implementation for unit testing
pub trait HidTransport: Send {
    type Handle: HidHandle;

    /// Open the device with the given VID/PID.
    fn open(&self, vid: u16, pid: u16) -> Result<Self::Handle, TransportError>;
}

/// An open device handle. The underlying OS handle is released on drop.
pub trait HidHandle: Send {
    /// Send a feature report. The report-id byte is included in `data`.
    fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Blocking read of one input report into `buf`; returns bytes read.
    fn read_report(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}
