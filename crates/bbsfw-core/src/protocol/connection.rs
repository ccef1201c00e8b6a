//! Controller connection
//!
//! Owns the transport, runs a reader thread that feeds the frame receiver,
//! and exposes the request operations as async functions that resolve when
//! the matching response arrives or their timeout passes.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::completion::{CompletionQueue, RequestResult};
use super::frame::Frame;
use super::message::{FirmwareVersion, Message};
use super::receiver::FrameReceiver;
use super::serial::SerialTransport;
use super::stream::{CommunicationChannel, Transport};
use super::{
    ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_HANDSHAKE_INTERVAL_MS, DEFAULT_READ_POLL_MS,
    DEFAULT_STALE_GAP_MS,
};
use crate::config::{self, Configuration};
use crate::device::{ControllerType, DeviceInfo};
use crate::eventlog::EventLogEntry;

/// Highest voltage the calibration request can carry (u16 centivolts)
const MAX_CALIBRATION_VOLTS: f32 = 655.35;

/// Receives connection lifecycle and event log notifications
///
/// Callbacks run on the reader thread and must not block.
pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self, _device: &DeviceInfo) {}
    fn on_disconnected(&self) {}
    fn on_event_log(&self, _entry: &EventLogEntry) {}
}

struct NoopObserver;

impl ConnectionObserver for NoopObserver {}

/// Observer notifications as values, for channel-based consumers
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected(DeviceInfo),
    Disconnected,
    EventLog(EventLogEntry),
}

impl ConnectionObserver for mpsc::UnboundedSender<ConnectionEvent> {
    fn on_connected(&self, device: &DeviceInfo) {
        let _ = self.send(ConnectionEvent::Connected(device.clone()));
    }

    fn on_disconnected(&self) {
        let _ = self.send(ConnectionEvent::Disconnected);
    }

    fn on_event_log(&self, entry: &EventLogEntry) {
        let _ = self.send(ConnectionEvent::EventLog(entry.clone()));
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Connected and ready
    Connected,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Interval between firmware version requests while connecting
    pub handshake_interval_ms: u64,
    /// Gap after which buffered bytes are dropped as stale
    pub stale_gap_ms: u64,
    /// Read timeout of the reader thread
    pub read_poll_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            handshake_interval_ms: DEFAULT_HANDSHAKE_INTERVAL_MS,
            stale_gap_ms: DEFAULT_STALE_GAP_MS,
            read_poll_ms: DEFAULT_READ_POLL_MS,
        }
    }
}

/// Link state guarded by one lock
struct Link {
    state: ConnectionState,
    device: Option<DeviceInfo>,
    /// Write half of the transport
    channel: Option<Box<dyn CommunicationChannel>>,
    /// Bumped on every connect and close so a stale reader stops
    generation: u64,
    reader: Option<JoinHandle<()>>,
}

/// State shared with the reader thread
///
/// Lock order is `link` then `receiver`; the reader never holds `receiver`
/// while dispatching.
struct Shared {
    config: ConnectionConfig,
    link: Mutex<Link>,
    receiver: Mutex<FrameReceiver>,
    handshake: CompletionQueue<FirmwareVersion>,
    read_config: CompletionQueue<Configuration>,
    write_config: CompletionQueue<bool>,
    reset_config: CompletionQueue<bool>,
    calibrate_voltage: CompletionQueue<bool>,
    observer: RwLock<Arc<dyn ConnectionObserver>>,
}

/// Connection to a BBS-FW controller
pub struct Connection {
    shared: Arc<Shared>,
    transport: Box<dyn Transport>,
}

impl Connection {
    /// Create a connection using serial ports (not yet connected)
    pub fn new(config: ConnectionConfig) -> Self {
        let transport = SerialTransport::new(config.baud_rate);
        Self::with_transport(config, transport)
    }

    /// Create a connection over a custom transport
    pub fn with_transport<T: Transport + 'static>(config: ConnectionConfig, transport: T) -> Self {
        let stale_after = Duration::from_millis(config.stale_gap_ms);
        Self {
            shared: Arc::new(Shared {
                config,
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    device: None,
                    channel: None,
                    generation: 0,
                    reader: None,
                }),
                receiver: Mutex::new(FrameReceiver::new(stale_after)),
                handshake: CompletionQueue::new(),
                read_config: CompletionQueue::new(),
                write_config: CompletionQueue::new(),
                reset_config: CompletionQueue::new(),
                calibrate_voltage: CompletionQueue::new(),
                observer: RwLock::new(Arc::new(NoopObserver)),
            }),
            transport: Box::new(transport),
        }
    }

    /// Replace the observer receiving lifecycle and event log notifications
    pub fn set_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock_link().state
    }

    /// Identity of the connected controller
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.shared.lock_link().device.clone()
    }

    /// Open `port` and perform the handshake
    ///
    /// Returns `Ok(false)` if the controller didn't answer within `timeout`.
    /// The firmware only listens for a short window after power-up, so the
    /// version request is repeated until it does.
    pub async fn connect(&self, port: &str, timeout: Duration) -> Result<bool, ProtocolError> {
        let generation = self.open(port)?;
        info!("Connecting to {}", port);

        let interval = Duration::from_millis(self.shared.config.handshake_interval_ms);
        let wait = self.shared.handshake.register(timeout).wait();
        tokio::pin!(wait);

        loop {
            if let Err(e) = self.shared.send(&Frame::read_fw_version()) {
                self.shared.close(Some(generation));
                return Err(e);
            }

            tokio::select! {
                result = &mut wait => match result {
                    RequestResult::Completed(_) => return Ok(true),
                    RequestResult::TimedOut => break,
                    RequestResult::Aborted => return Err(ProtocolError::ConnectionLost),
                },
                _ = tokio::time::sleep(interval) => {}
            }
        }

        // a response racing the deadline still counts
        if self.shared.is_connected(generation) {
            return Ok(true);
        }

        warn!("No response from controller on {} within {:?}", port, timeout);
        self.shared.close(Some(generation));
        Ok(false)
    }

    /// Open the transport and start the reader thread
    fn open(&self, port: &str) -> Result<u64, ProtocolError> {
        let mut link = self.shared.lock_link();
        if link.state != ConnectionState::Disconnected {
            return Err(ProtocolError::AlreadyConnected);
        }

        let mut channel = self.transport.open(port)?;
        channel.clear_input_buffer()?;
        let mut reader_channel = channel.try_clone()?;
        reader_channel.set_timeout(Duration::from_millis(self.shared.config.read_poll_ms))?;

        let generation = link.generation + 1;
        let shared = Arc::clone(&self.shared);
        let reader = thread::Builder::new()
            .name("bbsfw-reader".to_string())
            .spawn(move || shared.read_loop(reader_channel, generation))?;

        self.shared.lock_receiver().clear();
        link.generation = generation;
        link.state = ConnectionState::Connecting;
        link.device = None;
        link.channel = Some(channel);
        link.reader = Some(reader);
        Ok(generation)
    }

    /// Close the connection
    ///
    /// Safe to call at any time. Pending requests fail with
    /// [`ProtocolError::ConnectionLost`].
    pub fn close(&self) {
        self.shared.close(None);
    }

    /// Read the controller's configuration record
    pub async fn read_configuration(
        &self,
        timeout: Duration,
    ) -> Result<RequestResult<Configuration>, ProtocolError> {
        self.shared.ensure_connected()?;
        let waiter = self.shared.read_config.register(timeout);
        self.shared.send(&Frame::read_config())?;
        finish(waiter.wait().await)
    }

    /// Validate and write a configuration record
    ///
    /// The result is the controller's acknowledgement: `true` once the record
    /// is stored in eeprom.
    pub async fn write_configuration(
        &self,
        configuration: &Configuration,
        timeout: Duration,
    ) -> Result<RequestResult<bool>, ProtocolError> {
        let device = self.shared.ensure_connected()?;
        if device.config_version != config::CURRENT_VERSION {
            return Err(ProtocolError::UnsupportedConfigVersion {
                device: device.config_version,
                supported: config::CURRENT_VERSION,
            });
        }
        configuration.validate_for(device.controller)?;

        let waiter = self.shared.write_config.register(timeout);
        self.shared.send(&Frame::write_config(configuration))?;
        finish(waiter.wait().await)
    }

    /// Restore the controller's factory configuration
    pub async fn reset_configuration(
        &self,
        timeout: Duration,
    ) -> Result<RequestResult<bool>, ProtocolError> {
        self.shared.ensure_connected()?;
        let waiter = self.shared.reset_config.register(timeout);
        self.shared.send(&Frame::write_reset_config())?;
        finish(waiter.wait().await)
    }

    /// Calibrate the controller's battery voltage reading to `volts`
    pub async fn calibrate_voltage(
        &self,
        volts: f32,
        timeout: Duration,
    ) -> Result<RequestResult<bool>, ProtocolError> {
        if !(0.0..=MAX_CALIBRATION_VOLTS).contains(&volts) {
            return Err(ProtocolError::InvalidArgument(format!(
                "calibration voltage {} outside 0-{}",
                volts, MAX_CALIBRATION_VOLTS
            )));
        }
        self.shared.ensure_connected()?;

        let centivolts = (volts * 100.0).round() as u16;
        let waiter = self.shared.calibrate_voltage.register(timeout);
        self.shared
            .send(&Frame::write_voltage_calibration(centivolts))?;
        finish(waiter.wait().await)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close(None);
    }
}

fn finish<T>(result: RequestResult<T>) -> Result<RequestResult<T>, ProtocolError> {
    match result {
        RequestResult::Aborted => Err(ProtocolError::ConnectionLost),
        other => Ok(other),
    }
}

fn write_frame(channel: &mut dyn CommunicationChannel, frame: &Frame) -> io::Result<()> {
    let bytes = frame.to_bytes();
    debug!("Sending {:02x?}", bytes);
    channel.write_all(&bytes)?;
    channel.flush()
}

impl Shared {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_receiver(&self) -> MutexGuard<'_, FrameReceiver> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observer(&self) -> Arc<dyn ConnectionObserver> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_link().generation == generation
    }

    fn is_connected(&self, generation: u64) -> bool {
        let link = self.lock_link();
        link.generation == generation && link.state == ConnectionState::Connected
    }

    fn ensure_connected(&self) -> Result<DeviceInfo, ProtocolError> {
        let link = self.lock_link();
        match (&link.state, &link.device) {
            (ConnectionState::Connected, Some(device)) => Ok(device.clone()),
            _ => Err(ProtocolError::NotConnected),
        }
    }

    /// Write a frame; a write failure closes the connection
    fn send(&self, frame: &Frame) -> Result<(), ProtocolError> {
        let generation = {
            let mut link = self.lock_link();
            let Some(channel) = link.channel.as_mut() else {
                return Err(ProtocolError::NotConnected);
            };
            match write_frame(&mut **channel, frame) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Write failed: {}", e);
                    link.generation
                }
            }
        };
        self.close(Some(generation));
        Err(ProtocolError::ConnectionLost)
    }

    /// Tear down the link
    ///
    /// With `Some(generation)`, only closes if that connection is still the
    /// current one.
    fn close(&self, generation: Option<u64>) {
        let (was_open, reader) = {
            let mut link = self.lock_link();
            if generation.is_some_and(|g| g != link.generation) {
                return;
            }
            let was_open = link.channel.is_some();
            link.channel = None;
            link.state = ConnectionState::Disconnected;
            link.device = None;
            link.generation += 1;
            (was_open, link.reader.take())
        };

        self.lock_receiver().clear();

        self.handshake.abort();
        self.read_config.abort();
        self.write_config.abort();
        self.reset_config.abort();
        self.calibrate_voltage.abort();

        if let Some(reader) = reader {
            if reader.thread().id() != thread::current().id() {
                let _ = reader.join();
            }
        }

        if was_open {
            info!("Connection closed");
            self.observer().on_disconnected();
        }
    }

    /// Reader thread body: read until closed or the transport fails
    fn read_loop(&self, mut channel: Box<dyn CommunicationChannel>, generation: u64) {
        let mut buf = [0u8; 64];

        while self.is_current(generation) {
            match channel.read(&mut buf) {
                Ok(0) => {
                    debug!("Transport reached end of stream");
                    break;
                }
                Ok(n) => {
                    let messages = self.lock_receiver().feed(&buf[..n]);
                    for message in messages {
                        self.dispatch(generation, message);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    warn!("Read failed: {}", e);
                    break;
                }
            }
        }

        self.close(Some(generation));
        trace!("Reader {} stopped", generation);
    }

    /// Route a parsed message to whoever is waiting for it
    fn dispatch(&self, generation: u64, message: Message) {
        let state = {
            let link = self.lock_link();
            if link.generation != generation {
                return;
            }
            link.state
        };

        match message {
            Message::ReadFwVersion(version) => {
                if state == ConnectionState::Connecting {
                    self.on_handshake(generation, version);
                } else {
                    trace!("Ignoring firmware version outside handshake");
                }
            }
            Message::EventLog { code, data } => {
                let entry = EventLogEntry::new(code, data);
                debug!("Event log: {}", entry);
                self.observer().on_event_log(&entry);
            }
            _ if state != ConnectionState::Connected => {
                debug!("Ignoring {:?} while {:?}", message, state);
            }
            Message::ReadConfig { version, payload } => match config::decode(version, &payload) {
                Ok(configuration) => {
                    self.read_config.complete(configuration);
                }
                Err(e) => warn!("Failed to decode configuration: {}", e),
            },
            Message::WriteConfigAck { ok } => {
                self.write_config.complete(ok);
            }
            Message::WriteResetConfigAck { ok } => {
                self.reset_config.complete(ok);
            }
            Message::WriteVoltageCalibrationAck => {
                self.calibrate_voltage.complete(true);
            }
            Message::ReadEventLogAck { .. } | Message::WriteEventLogAck { .. } => {
                trace!("Ignoring {:?}", message);
            }
        }
    }

    fn on_handshake(&self, generation: u64, version: FirmwareVersion) {
        let device = {
            let mut link = self.lock_link();
            if link.generation != generation || link.state != ConnectionState::Connecting {
                return;
            }

            let device = DeviceInfo {
                controller: version
                    .controller
                    .map(ControllerType::from_byte)
                    .unwrap_or_default(),
                firmware_version: version.version_string(),
                config_version: version.config_version,
            };
            link.state = ConnectionState::Connected;
            link.device = Some(device.clone());

            if let Some(channel) = link.channel.as_mut() {
                if let Err(e) = write_frame(&mut **channel, &Frame::write_event_log_enable(true)) {
                    warn!("Failed to enable event log: {}", e);
                }
            }
            device
        };

        info!(
            "Connected to {} controller, firmware {}, config version {}",
            device.controller, device.firmware_version, device.config_version
        );
        self.observer().on_connected(&device);
        self.handshake.complete(version);
    }
}
