//! Observer interface for consumer decoupling.
//!
//! Lets a GUI, CLI, or notifier subscribe to readings and connection
//! changes without tight coupling to the polling core.

use std::fmt;

/// Connection state of the sensor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport handle; initial state, and where every failure lands.
    Disconnected,
    /// Device opened, init feature report not yet acknowledged.
    Connecting,
    /// Device initialized and emitting reports.
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
        }
    }
}

/// Observer trait for receiving sensor events.
///
/// Implement this in your consumer layer. Calls arrive on the polling
/// worker; implementations that need another context hand off themselves.
pub trait Co2Observer: Send + Sync {
    /// A validated CO2 reading, in parts per million.
    fn on_co2_reading(&self, ppm: u16);

    /// A validated temperature reading, in degrees Celsius.
    fn on_temperature_reading(&self, celsius: f32);

    /// Fired once with the initial status at construction, and thereafter
    /// only on change.
    fn on_connection_status(&self, status: ConnectionStatus);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl Co2Observer for NullObserver {
    fn on_co2_reading(&self, _ppm: u16) {}

    fn on_temperature_reading(&self, _celsius: f32) {}

    fn on_connection_status(&self, _status: ConnectionStatus) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl Co2Observer for TracingObserver {
    fn on_co2_reading(&self, ppm: u16) {
        tracing::info!(ppm, "CO2 reading");
    }

    fn on_temperature_reading(&self, celsius: f32) {
        tracing::info!(celsius, "Temperature reading");
    }

    fn on_connection_status(&self, status: ConnectionStatus) {
        tracing::info!(status = %status, "Connection status");
    }
}
