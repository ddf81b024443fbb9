//! Device session - owns the HID handle and drives connect, poll, and
//! reconnect.
//!
//! One session per sensor. Failures below this boundary are absorbed and
//! translated into status transitions; observers only ever see well-formed
//! readings and status values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{Co2Observer, ConnectionStatus, TracingObserver};
use crate::protocol::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_READ_TIMEOUT_MS, FEATURE_REPORT_SIZE, KEY, PRODUCT_ID,
    REPORT_ID, REPORT_SIZE, VENDOR_ID,
};
use crate::protocol::{Reading, decode, decrypt_and_validate};
use crate::transport::{HidHandle, HidTransport};

/// Configuration for a sensor session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Polling cadence for continuous updates, in milliseconds.
    pub poll_interval_ms: u64,
    /// Blocking-read timeout per input report, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Sensor session: connect/poll/reconnect state machine with cached last
/// readings and deduplicated status notifications.
pub struct Co2Session<T: HidTransport, O: Co2Observer> {
    inner: Arc<Mutex<SessionInner<T, O>>>,
    updater: Mutex<Option<Updater>>,
}

struct Updater {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct SessionInner<T: HidTransport, O: Co2Observer> {
    transport: T,
    handle: Option<T::Handle>,
    config: SessionConfig,
    observer: Arc<O>,
    last_status: ConnectionStatus,
    last_co2: Option<u16>,
    last_temperature: Option<f32>,
}

impl<T: HidTransport> Co2Session<T, TracingObserver> {
    /// Create a new session with the default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: HidTransport, O: Co2Observer> Co2Session<T, O> {
    /// Create a new session with a custom observer.
    ///
    /// The observer is notified once with the initial status.
    pub fn with_observer(transport: T, config: SessionConfig, observer: Arc<O>) -> Self {
        observer.on_connection_status(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                transport,
                handle: None,
                config,
                observer,
                last_status: ConnectionStatus::Disconnected,
                last_co2: None,
                last_temperature: None,
            })),
            updater: Mutex::new(None),
        }
    }

    /// Open and initialize the device if not already connected.
    ///
    /// If no device is found the session stays Disconnected; the caller is
    /// expected to retry on its next tick.
    pub fn connect(&self) {
        self.inner.lock().unwrap().connect();
    }

    /// Stop continuous updates, close the transport, and report
    /// Disconnected. Idempotent. Must not be called from observer
    /// callbacks.
    pub fn disconnect(&self) {
        self.stop_continuous_updates();
        self.inner.lock().unwrap().teardown();
    }

    /// Poll until one CO2 and one temperature reading have been obtained,
    /// or the connection is lost mid-loop.
    ///
    /// Connects first if needed. Blocks the calling thread for up to two
    /// read timeouts plus however long the sensor takes to rotate through
    /// both frame kinds.
    pub fn poll_once(&self) {
        self.inner.lock().unwrap().poll_once();
    }

    /// Whether a transport handle is currently held.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().handle.is_some()
    }

    /// Most recent validated CO2 reading, surviving reconnects.
    pub fn last_co2(&self) -> Option<u16> {
        self.inner.lock().unwrap().last_co2
    }

    /// Most recent validated temperature reading, surviving reconnects.
    pub fn last_temperature(&self) -> Option<f32> {
        self.inner.lock().unwrap().last_temperature
    }

    /// Begin invoking `poll_once` on the configured cadence from a
    /// background worker. Starting while already running is a no-op.
    /// Ticks never overlap; the worker serializes them itself.
    pub fn start_continuous_updates(&self)
    where
        T: 'static,
        T::Handle: 'static,
        O: 'static,
    {
        let mut updater = self.updater.lock().unwrap();
        if updater.is_some() {
            return;
        }

        let interval = Duration::from_millis(self.inner.lock().unwrap().config.poll_interval_ms);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let inner = Arc::clone(&self.inner);

        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                inner.lock().unwrap().poll_once();
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(interval);
            }
        });

        *updater = Some(Updater { stop, handle });
    }

    /// Halt the polling cadence. Never aborts an in-flight `poll_once`;
    /// the worker exits before its next tick. Safe to call when not
    /// running. Must not be called from observer callbacks.
    pub fn stop_continuous_updates(&self) {
        if let Some(updater) = self.updater.lock().unwrap().take() {
            updater.stop.store(true, Ordering::Relaxed);
            let _ = updater.handle.join();
        }
    }
}

impl<T: HidTransport, O: Co2Observer> Drop for Co2Session<T, O> {
    fn drop(&mut self) {
        if let Some(updater) = self.updater.lock().unwrap().take() {
            updater.stop.store(true, Ordering::Relaxed);
            let _ = updater.handle.join();
        }
    }
}

impl<T: HidTransport, O: Co2Observer> SessionInner<T, O> {
    fn connect(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let handle = match self.transport.open(VENDOR_ID, PRODUCT_ID) {
            Ok(handle) => handle,
            Err(err) => {
                debug!(error = %err, "No device found");
                return;
            }
        };

        self.set_status(ConnectionStatus::Connecting);

        // Report id followed by the key; this tells the sensor to start
        // emitting encrypted input reports.
        let mut report = [0u8; FEATURE_REPORT_SIZE];
        report[0] = REPORT_ID;
        report[1..].copy_from_slice(&KEY);

        if let Err(err) = handle.send_feature_report(&report) {
            warn!(error = %err, "Failed to send init feature report");
            self.set_status(ConnectionStatus::Disconnected);
            return;
        }

        self.handle = Some(handle);
        info!("Device initialized");
        self.set_status(ConnectionStatus::Connected);
    }

    fn poll_once(&mut self) {
        if self.handle.is_none() {
            self.connect();
        }

        let mut got_co2 = false;
        let mut got_temperature = false;

        while !(got_co2 && got_temperature) {
            if self.handle.is_none() {
                break;
            }

            match self.read_frame() {
                Some(Reading::Co2(ppm)) => {
                    self.last_co2 = Some(ppm);
                    self.observer.on_co2_reading(ppm);
                    got_co2 = true;
                }
                Some(Reading::Temperature(celsius)) => {
                    self.last_temperature = Some(celsius);
                    self.observer.on_temperature_reading(celsius);
                    got_temperature = true;
                }
                Some(Reading::Unrecognized) => {}
                None => break,
            }
        }
    }

    /// Read, decrypt, and decode one frame. Returns `None` when the
    /// connection was lost; the transport is torn down before returning.
    fn read_frame(&mut self) -> Option<Reading> {
        let handle = self.handle.as_ref()?;
        let mut buf = [0u8; REPORT_SIZE];
        let timeout = Duration::from_millis(self.config.read_timeout_ms);

        let n = match handle.read_report(&mut buf, timeout) {
            Ok(n) => n,
            Err(err) => {
                warn!(error = %err, "Read failed, dropping connection");
                self.teardown();
                return None;
            }
        };
        if n != REPORT_SIZE {
            warn!(bytes_read = n, "Short report, dropping connection");
            self.teardown();
            return None;
        }

        match decrypt_and_validate(&buf) {
            Ok(plain) => Some(decode(&plain)),
            Err(err) => {
                // A failed checksum on this device means a desynchronized
                // or unplugged unit, not a one-frame glitch.
                warn!(error = %err, "Integrity check failed, dropping connection");
                self.teardown();
                None
            }
        }
    }

    /// Drop the transport handle and report Disconnected. Leaves any
    /// running update cadence alone so the next tick can reconnect.
    fn teardown(&mut self) {
        self.handle = None;
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if status != self.last_status {
            info!(from = %self.last_status, to = %status, "Connection status changed");
            self.last_status = status;
            self.observer.on_connection_status(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::cipher::encode_frame;
    use crate::protocol::constants::{OP_CO2, OP_TEMPERATURE};
    use crate::transport::{MockTransport, TransportError};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Co2(u16),
        Temperature(f32),
        Status(ConnectionStatus),
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingObserver {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn statuses(&self) -> Vec<ConnectionStatus> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Status(s) => Some(s),
                    _ => None,
                })
                .collect()
        }

        fn readings(&self) -> Vec<Event> {
            self.events()
                .into_iter()
                .filter(|e| !matches!(e, Event::Status(_)))
                .collect()
        }
    }

    impl Co2Observer for RecordingObserver {
        fn on_co2_reading(&self, ppm: u16) {
            self.events.lock().unwrap().push(Event::Co2(ppm));
        }

        fn on_temperature_reading(&self, celsius: f32) {
            self.events.lock().unwrap().push(Event::Temperature(celsius));
        }

        fn on_connection_status(&self, status: ConnectionStatus) {
            self.events.lock().unwrap().push(Event::Status(status));
        }
    }

    fn session(
        mock: &MockTransport,
    ) -> (Co2Session<MockTransport, RecordingObserver>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let session = Co2Session::with_observer(
            mock.clone(),
            SessionConfig {
                poll_interval_ms: 10,
                read_timeout_ms: 100,
            },
            Arc::clone(&observer),
        );
        (session, observer)
    }

    #[test]
    fn test_initial_status_notified_once() {
        let mock = MockTransport::new();
        let (_session, observer) = session(&mock);
        assert_eq!(
            observer.events(),
            vec![Event::Status(ConnectionStatus::Disconnected)]
        );
    }

    #[test]
    fn test_connect_transitions_and_sends_feature_report() {
        let mock = MockTransport::new();
        let (session, observer) = session(&mock);

        session.connect();
        assert!(session.is_connected());
        assert_eq!(
            observer.statuses(),
            vec![
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
            ]
        );

        let mut expected = vec![REPORT_ID];
        expected.extend_from_slice(&KEY);
        assert_eq!(mock.feature_reports(), vec![expected]);
    }

    #[test]
    fn test_connect_twice_does_not_renotify() {
        let mock = MockTransport::new();
        let (session, observer) = session(&mock);

        session.connect();
        session.connect();

        assert_eq!(observer.statuses().len(), 3);
        assert_eq!(mock.open_count(), 1);
    }

    #[test]
    fn test_connect_open_failure_stays_disconnected() {
        let mock = MockTransport::new();
        mock.set_present(false);
        let (session, observer) = session(&mock);

        session.connect();
        assert!(!session.is_connected());
        assert_eq!(
            observer.statuses(),
            vec![ConnectionStatus::Disconnected]
        );
    }

    #[test]
    fn test_connect_feature_report_failure_tears_down() {
        let mock = MockTransport::new();
        mock.set_feature_report_error(true);
        let (session, observer) = session(&mock);

        session.connect();
        assert!(!session.is_connected());
        assert_eq!(
            observer.statuses(),
            vec![
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[test]
    fn test_poll_once_obtains_both_readings_in_order() {
        let mock = MockTransport::new();
        mock.queue_frame(&encode_frame(OP_TEMPERATURE, 0x1300));
        mock.queue_frame(&encode_frame(OP_CO2, 812));
        let (session, observer) = session(&mock);

        session.poll_once();

        assert!(session.is_connected());
        assert_eq!(
            observer.readings(),
            vec![
                Event::Temperature(4864.0_f32 / 16.0 - 273.15),
                Event::Co2(812),
            ]
        );
        assert_eq!(session.last_co2(), Some(812));
        assert_eq!(session.last_temperature(), Some(4864.0_f32 / 16.0 - 273.15));
    }

    #[test]
    fn test_poll_once_skips_unrecognized_frames() {
        let mock = MockTransport::new();
        mock.queue_frame(&encode_frame(0x41, 1234));
        mock.queue_frame(&encode_frame(OP_CO2, 20001)); // over-range artifact
        mock.queue_frame(&encode_frame(OP_CO2, 20000));
        mock.queue_frame(&encode_frame(OP_TEMPERATURE, 0x1112));
        let (session, observer) = session(&mock);

        session.poll_once();

        assert_eq!(
            observer.readings(),
            vec![
                Event::Co2(20000),
                Event::Temperature(4370.0_f32 / 16.0 - 273.15),
            ]
        );
    }

    #[test]
    fn test_poll_once_first_read_failure() {
        let mock = MockTransport::new();
        // Connects fine, then the very first read times out.
        let (session, observer) = session(&mock);

        session.poll_once();

        assert!(!session.is_connected());
        assert!(observer.readings().is_empty());
        assert_eq!(
            observer.statuses(),
            vec![
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[test]
    fn test_read_error_mid_loop_keeps_partial_notifications() {
        let mock = MockTransport::new();
        mock.queue_frame(&encode_frame(OP_CO2, 600));
        mock.queue_read_error(TransportError::ReadFailed("gone".into()));
        let (session, observer) = session(&mock);

        session.poll_once();

        assert!(!session.is_connected());
        assert_eq!(observer.readings(), vec![Event::Co2(600)]);
    }

    #[test]
    fn test_checksum_failure_forces_disconnect() {
        let mock = MockTransport::new();
        mock.queue_frame(&[0u8; 8]); // decrypts to garbage
        let (session, observer) = session(&mock);

        session.poll_once();

        assert!(!session.is_connected());
        assert!(observer.readings().is_empty());
        assert_eq!(
            observer.statuses().last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }

    #[test]
    fn test_short_report_forces_disconnect() {
        let mock = MockTransport::new();
        mock.queue_frame(&[0x01, 0x02, 0x03]);
        let (session, _observer) = session(&mock);

        session.poll_once();
        assert!(!session.is_connected());
    }

    #[test]
    fn test_caches_persist_across_reconnect() {
        let mock = MockTransport::new();
        mock.queue_frame(&encode_frame(OP_CO2, 700));
        mock.queue_frame(&encode_frame(OP_TEMPERATURE, 0x1300));
        let (session, observer) = session(&mock);

        session.poll_once();
        assert_eq!(session.last_co2(), Some(700));

        // Next tick: empty queue, read times out, connection drops.
        session.poll_once();
        assert!(!session.is_connected());
        assert_eq!(session.last_co2(), Some(700));
        assert!(session.last_temperature().is_some());

        // Replug: the cadence reconnects and overwrites the caches.
        mock.queue_frame(&encode_frame(OP_CO2, 900));
        mock.queue_frame(&encode_frame(OP_TEMPERATURE, 0x1310));
        session.poll_once();
        assert_eq!(session.last_co2(), Some(900));
        assert_eq!(mock.open_count(), 2);

        // Full cycle Connected -> Disconnected -> Connecting -> Connected
        // notified exactly three times, in order.
        let statuses = observer.statuses();
        assert_eq!(
            statuses[3..6],
            [
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
            ]
        );
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mock = MockTransport::new();
        let (session, observer) = session(&mock);

        session.connect();
        session.disconnect();
        session.disconnect();

        assert!(!session.is_connected());
        assert_eq!(
            observer.statuses(),
            vec![
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[test]
    fn test_continuous_updates_lifecycle() {
        let mock = MockTransport::new();
        mock.set_present(false);
        let (session, observer) = session(&mock);

        // Stop before start is safe.
        session.stop_continuous_updates();

        session.start_continuous_updates();
        session.start_continuous_updates(); // no-op while running
        thread::sleep(Duration::from_millis(50));
        session.stop_continuous_updates();

        // Device absent the whole time: no readings, no status noise.
        assert!(observer.readings().is_empty());
        assert_eq!(
            observer.statuses(),
            vec![ConnectionStatus::Disconnected]
        );

        // Restart after stop works.
        session.start_continuous_updates();
        session.stop_continuous_updates();
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.read_timeout_ms, 5000);
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = std::env::temp_dir().join("co2-core-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");

        let config = SessionConfig {
            poll_interval_ms: 250,
            read_timeout_ms: 2000,
        };
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.poll_interval_ms, 250);
        assert_eq!(loaded.read_timeout_ms, 2000);
    }
}
