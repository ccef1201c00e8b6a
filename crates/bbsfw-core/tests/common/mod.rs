//! In-memory controller used by the integration tests
//!
//! Answers requests the way BBS-FW does, one complete frame per write.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bbsfw_core::config::{self, Configuration};
use bbsfw_core::protocol::{
    checksum, CommunicationChannel, ConnectionConfig, ProtocolError, Transport,
};

pub const MISSING_PORT: &str = "/dev/missing";

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connection settings with a short reader poll
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        read_poll_ms: 10,
        handshake_interval_ms: 50,
        ..ConnectionConfig::default()
    }
}

pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut bytes = body.to_vec();
    bytes.push(checksum(body));
    bytes
}

struct DeviceState {
    /// Bytes waiting for the host
    to_host: VecDeque<u8>,
    /// Frames written by the host
    received: Vec<Vec<u8>>,
    fw_version: Option<Vec<u8>>,
    config_version: u8,
    record: Vec<u8>,
    write_status: u8,
    responsive: bool,
    /// Largest chunk handed out per read
    chunk: usize,
    fail_reads: bool,
    open_channels: usize,
}

/// Shared handle to the fake controller
#[derive(Clone)]
pub struct FakeDevice {
    state: Arc<(Mutex<DeviceState>, Condvar)>,
}

impl FakeDevice {
    /// Firmware 1.2.0, config version 3, legacy version response
    pub fn new() -> Self {
        let record = config::encode(&Configuration::factory_defaults());
        let device = Self {
            state: Arc::new((
                Mutex::new(DeviceState {
                    to_host: VecDeque::new(),
                    received: Vec::new(),
                    fw_version: None,
                    config_version: config::CURRENT_VERSION,
                    record,
                    write_status: 1,
                    responsive: true,
                    chunk: 5,
                    fail_reads: false,
                    open_channels: 0,
                }),
                Condvar::new(),
            )),
        };
        device.set_fw_version(frame(&[0x01, 0x01, 0x01, 0x02, 0x00, 0x03]));
        device
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.0.lock().unwrap()
    }

    pub fn set_fw_version(&self, response: Vec<u8>) {
        self.lock().fw_version = Some(response);
    }

    /// Never answer the handshake
    pub fn mute_handshake(&self) {
        self.lock().fw_version = None;
    }

    /// Stop answering any request
    pub fn set_responsive(&self, responsive: bool) {
        self.lock().responsive = responsive;
    }

    pub fn set_write_status(&self, status: u8) {
        self.lock().write_status = status;
    }

    /// Report an older configuration layout during handshake and reads
    pub fn set_record(&self, version: u8, record: Vec<u8>) {
        let mut state = self.lock();
        state.config_version = version;
        state.record = record;
    }

    pub fn record(&self) -> Vec<u8> {
        self.lock().record.clone()
    }

    /// Queue raw bytes for the host
    pub fn push(&self, bytes: &[u8]) {
        self.lock().to_host.extend(bytes.iter().copied());
        self.state.1.notify_all();
    }

    /// Make the next read fail
    pub fn fail_reads(&self) {
        self.lock().fail_reads = true;
        self.state.1.notify_all();
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.lock().received.clone()
    }

    pub fn count_received(&self, prefix: &[u8]) -> usize {
        self.lock()
            .received
            .iter()
            .filter(|f| f.starts_with(prefix))
            .count()
    }

    pub fn open_channels(&self) -> usize {
        self.lock().open_channels
    }

    /// Poll until `condition` holds or `timeout` passes
    pub fn wait_until(&self, timeout: Duration, condition: impl Fn(&FakeDevice) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition(self)
    }

    fn handle(&self, request: &[u8]) {
        let mut state = self.lock();
        state.received.push(request.to_vec());
        if !state.responsive || request.len() < 3 {
            return;
        }

        let response = match (request[0], request[1]) {
            (0x01, 0x01) => state.fw_version.clone(),
            (0x01, 0x03) => {
                let mut body = vec![0x01, 0x03, state.config_version, state.record.len() as u8];
                body.extend_from_slice(&state.record);
                Some(frame(&body))
            }
            (0x02, 0xf0) => Some(frame(&[0x02, 0xf0, request[2]])),
            (0x02, 0xf1) => {
                let size = request[3] as usize;
                if request[2] == state.config_version && request.len() == 4 + size + 1 {
                    state.record = request[4..4 + size].to_vec();
                }
                Some(frame(&[0x02, 0xf1, state.write_status]))
            }
            (0x02, 0xf2) => {
                state.record = config::encode(&Configuration::factory_defaults());
                Some(frame(&[0x02, 0xf2, state.write_status]))
            }
            (0x02, 0xf3) => Some(frame(&[0x02, 0xf3, 0x00])),
            _ => None,
        };

        if let Some(response) = response {
            state.to_host.extend(response);
            self.state.1.notify_all();
        }
    }
}

/// One open handle on the fake controller
pub struct FakeChannel {
    device: FakeDevice,
    timeout: Duration,
}

impl FakeChannel {
    fn new(device: FakeDevice) -> Self {
        device.lock().open_channels += 1;
        Self {
            device,
            timeout: Duration::from_millis(10),
        }
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.device.lock().open_channels -= 1;
    }
}

impl Read for FakeChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (lock, cvar) = &*self.device.state;
        let guard = lock.lock().unwrap();
        let (mut state, _) = cvar
            .wait_timeout_while(guard, self.timeout, |s| {
                s.to_host.is_empty() && !s.fail_reads
            })
            .unwrap();

        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        if state.to_host.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }

        let n = buf.len().min(state.chunk).min(state.to_host.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.to_host.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for FakeChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device.handle(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for FakeChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.device.lock().to_host.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn CommunicationChannel>> {
        Ok(Box::new(FakeChannel::new(self.device.clone())))
    }
}

/// Transport handing out channels to one fake controller
pub struct FakeTransport {
    pub device: FakeDevice,
}

impl Transport for FakeTransport {
    fn open(&self, port: &str) -> Result<Box<dyn CommunicationChannel>, ProtocolError> {
        if port == MISSING_PORT {
            return Err(ProtocolError::PortNotFound(port.to_string()));
        }
        Ok(Box::new(FakeChannel::new(self.device.clone())))
    }
}
