//! Protocol module - wire format of the CO2 sensor.

pub mod cipher;
pub mod constants;
pub mod reading;

pub use cipher::{ChecksumError, decrypt_and_validate};
pub use constants::*;
pub use reading::{Reading, decode};
