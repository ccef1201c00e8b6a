//! Transport abstraction
//!
//! The connection talks to the controller through a [`CommunicationChannel`]
//! obtained from a [`Transport`]. The serial implementation lives in
//! [`super::serial`]; tests plug in an in-memory device.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::ProtocolError;

/// Abstraction for a byte channel to the controller
pub trait CommunicationChannel: Read + Write + Send {
    /// Set timeout for read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Clear input buffers
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Try to clone the channel, sharing the same underlying device
    fn try_clone(&self) -> io::Result<Box<dyn CommunicationChannel>>;
}

/// Opens channels to a named port
///
/// Closing is done by dropping every channel handle.
pub trait Transport: Send + Sync {
    fn open(&self, port: &str) -> Result<Box<dyn CommunicationChannel>, ProtocolError>;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn try_clone(&self) -> io::Result<Box<dyn CommunicationChannel>> {
        let port_clone = self.port.try_clone().map_err(io::Error::other)?;
        Ok(Box::new(SerialChannel::new(port_clone)))
    }
}
