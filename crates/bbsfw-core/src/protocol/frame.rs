//! Frame encoding
//!
//! Request frames are `[request type, opcode, payload..., checksum]`, where
//! the checksum is the 8-bit wrapping sum of every byte before it.

use byteorder::{BigEndian, ByteOrder};

use super::commands::Command;
use super::{REQUEST_TYPE_READ, REQUEST_TYPE_WRITE};
use crate::config::{self, Configuration};

/// 8-bit modular sum of the given bytes
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Check that the last byte of `frame` is the checksum of the rest
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((expected, body)) => checksum(body) == *expected,
        None => false,
    }
}

/// An outbound request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub request_type: u8,
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encode the frame to raw bytes, checksum included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.push(self.request_type);
        bytes.push(self.opcode);
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes));
        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        2 + self.payload.len() + 1
    }

    /// The command this frame requests, if the opcode is known
    pub fn command(&self) -> Option<Command> {
        Command::from_opcode(self.request_type, self.opcode)
    }

    pub fn read_fw_version() -> Self {
        FrameBuilder::read(Command::ReadFwVersion.opcode()).build()
    }

    pub fn read_event_log_enable() -> Self {
        FrameBuilder::read(Command::ReadEventLogEnable.opcode()).build()
    }

    pub fn read_config() -> Self {
        FrameBuilder::read(Command::ReadConfig.opcode()).build()
    }

    pub fn write_event_log_enable(enabled: bool) -> Self {
        FrameBuilder::write(Command::WriteEventLogEnable.opcode())
            .byte(u8::from(enabled))
            .build()
    }

    /// Write-config request carrying the record in the newest layout
    pub fn write_config(configuration: &Configuration) -> Self {
        let record = config::encode(configuration);
        FrameBuilder::write(Command::WriteConfig.opcode())
            .byte(config::CURRENT_VERSION)
            .byte(record.len() as u8)
            .bytes(&record)
            .build()
    }

    pub fn write_reset_config() -> Self {
        FrameBuilder::write(Command::WriteResetConfig.opcode()).build()
    }

    /// Voltage calibration request, value in hundredths of a volt
    pub fn write_voltage_calibration(centivolts: u16) -> Self {
        FrameBuilder::write(Command::WriteVoltageCalibration.opcode())
            .u16_be(centivolts)
            .build()
    }
}

/// Builder for constructing request frames
pub struct FrameBuilder {
    request_type: u8,
    opcode: u8,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a read request
    pub fn read(opcode: u8) -> Self {
        Self {
            request_type: REQUEST_TYPE_READ,
            opcode,
            payload: Vec::new(),
        }
    }

    /// Start a write request
    pub fn write(opcode: u8) -> Self {
        Self {
            request_type: REQUEST_TYPE_WRITE,
            opcode,
            payload: Vec::new(),
        }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (big-endian)
    pub fn u16_be(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        BigEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Build the frame
    pub fn build(self) -> Frame {
        Frame {
            request_type: self.request_type,
            opcode: self.opcode,
            payload: self.payload,
        }
    }
}
