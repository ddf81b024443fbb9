//! co2-core: protocol decoder and device session for the ZyAura ZG01-based
//! USB CO2/temperature monitor.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, frame cipher, checksum validation, reading
//!   decode
//! - **Transport**: HID communication abstraction (hidapi, mock)
//! - **Events**: Observer pattern for consumer decoupling
//! - **Session**: Connect/poll/reconnect orchestrator
//!
//! # Example
//!
//! ```no_run
//! use co2_core::session::{Co2Session, SessionConfig};
//! use co2_core::transport::HidApiTransport;
//!
//! let transport = HidApiTransport::new().expect("hidapi init failed");
//! let session = Co2Session::new(transport, SessionConfig::default());
//! session.start_continuous_updates();
//! ```

pub mod events;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use events::{Co2Observer, ConnectionStatus, NullObserver, TracingObserver};
pub use protocol::{ChecksumError, Reading, decode, decrypt_and_validate};
pub use session::{Co2Session, SessionConfig};
pub use transport::{HidApiTransport, HidHandle, HidTransport, MockTransport, TransportError};
