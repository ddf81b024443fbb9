//! Transport layer module.

pub mod hid;
pub mod mock;
pub mod traits;

pub use hid::HidApiTransport;
pub use mock::MockTransport;
pub use traits::{HidHandle, HidTransport, TransportError};
