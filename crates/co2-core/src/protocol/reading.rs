//! Typed measurements decoded from validated frames.

use byteorder::{BigEndian, ByteOrder};

use super::constants::{CO2_MAX_PPM, OP_CO2, OP_TEMPERATURE, REPORT_SIZE};

/// A single decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// CO2 concentration in parts per million.
    Co2(u16),
    /// Temperature in degrees Celsius.
    Temperature(f32),
    /// Opcode not understood, or a value that must be discarded.
    Unrecognized,
}

/// Decode a validated frame into a typed reading.
///
/// Byte 0 is the opcode, bytes 1-2 a big-endian 16-bit value. Temperature
/// arrives in sixteenths of a Kelvin. The CO2 guard applies to every frame,
/// not just the first after connect.
pub fn decode(plain: &[u8; REPORT_SIZE]) -> Reading {
    let op = plain[0];
    let value = BigEndian::read_u16(&plain[1..3]);

    match op {
        OP_CO2 => {
            if value > CO2_MAX_PPM {
                Reading::Unrecognized
            } else {
                Reading::Co2(value)
            }
        }
        OP_TEMPERATURE => Reading::Temperature(f32::from(value) / 16.0 - 273.15),
        _ => Reading::Unrecognized,
    }
}
