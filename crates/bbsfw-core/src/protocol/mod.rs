//! Serial Protocol Communication
//!
//! Implements the BBS-FW extcom protocol: framed, checksummed requests and
//! responses over a 1200 baud serial link, plus the event log stream the
//! firmware pushes unprompted.

pub mod commands;
mod completion;
mod connection;
mod error;
pub mod frame;
mod message;
mod receiver;
pub mod serial;
pub mod stream;

pub use commands::Command;
pub use completion::{CompletionQueue, RequestResult, Waiter};
pub use connection::{
    Connection, ConnectionConfig, ConnectionEvent, ConnectionObserver, ConnectionState,
};
pub use error::ProtocolError;
pub use frame::{checksum, verify_checksum, Frame, FrameBuilder};
pub use message::{FirmwareVersion, Message};
pub use receiver::FrameReceiver;
pub use serial::{list_ports, PortInfo, SerialTransport};
pub use stream::{CommunicationChannel, SerialChannel, Transport};

/// Leading byte of read requests and their responses
pub const REQUEST_TYPE_READ: u8 = 0x01;

/// Leading byte of write requests and their acknowledgements
pub const REQUEST_TYPE_WRITE: u8 = 0x02;

/// Leading byte of an event log entry without data
pub const EVENT_LOG: u8 = 0xee;

/// Leading byte of an event log entry with a 16-bit value
pub const EVENT_LOG_DATA: u8 = 0xed;

/// Baud rate of the firmware's extcom uart
pub const DEFAULT_BAUD_RATE: u32 = 1200;

/// Interval between firmware version requests while connecting
pub const DEFAULT_HANDSHAKE_INTERVAL_MS: u64 = 200;

/// Gap after which a partially received frame is considered abandoned
pub const DEFAULT_STALE_GAP_MS: u64 = 1000;

/// Read timeout of the reader thread
pub const DEFAULT_READ_POLL_MS: u64 = 50;

/// Receive buffer bound
///
/// The firmware itself buffers 192 bytes and the largest valid frame is
/// 4 + 255 + 1 bytes.
pub const MAX_BUFFER_SIZE: usize = 256;
