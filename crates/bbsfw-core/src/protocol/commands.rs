//! Protocol commands
//!
//! Request types and opcodes understood by the BBS-FW firmware.

use serde::{Deserialize, Serialize};

use super::{REQUEST_TYPE_READ, REQUEST_TYPE_WRITE};

pub const OPCODE_READ_FW_VERSION: u8 = 0x01;
pub const OPCODE_READ_EVTLOG_ENABLE: u8 = 0x02;
pub const OPCODE_READ_CONFIG: u8 = 0x03;

pub const OPCODE_WRITE_EVTLOG_ENABLE: u8 = 0xf0;
pub const OPCODE_WRITE_CONFIG: u8 = 0xf1;
pub const OPCODE_WRITE_RESET_CONFIG: u8 = 0xf2;
pub const OPCODE_WRITE_ADC_VOLTAGE_CALIBRATION: u8 = 0xf3;

/// Protocol commands for controller communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Query firmware version, config format and controller model
    ReadFwVersion,

    /// Query whether the event log is streamed
    ReadEventLogEnable,

    /// Read the configuration record
    ReadConfig,

    /// Turn event log streaming on or off
    WriteEventLogEnable,

    /// Store a configuration record in eeprom
    WriteConfig,

    /// Restore factory configuration
    WriteResetConfig,

    /// Calibrate the battery voltage measurement
    WriteVoltageCalibration,
}

impl Command {
    /// Leading byte of request and response frames
    pub fn request_type(&self) -> u8 {
        match self {
            Command::ReadFwVersion | Command::ReadEventLogEnable | Command::ReadConfig => {
                REQUEST_TYPE_READ
            }
            _ => REQUEST_TYPE_WRITE,
        }
    }

    /// Second frame byte
    pub fn opcode(&self) -> u8 {
        match self {
            Command::ReadFwVersion => OPCODE_READ_FW_VERSION,
            Command::ReadEventLogEnable => OPCODE_READ_EVTLOG_ENABLE,
            Command::ReadConfig => OPCODE_READ_CONFIG,
            Command::WriteEventLogEnable => OPCODE_WRITE_EVTLOG_ENABLE,
            Command::WriteConfig => OPCODE_WRITE_CONFIG,
            Command::WriteResetConfig => OPCODE_WRITE_RESET_CONFIG,
            Command::WriteVoltageCalibration => OPCODE_WRITE_ADC_VOLTAGE_CALIBRATION,
        }
    }

    /// Look up a command from its request type and opcode
    pub fn from_opcode(request_type: u8, opcode: u8) -> Option<Self> {
        let command = match (request_type, opcode) {
            (REQUEST_TYPE_READ, OPCODE_READ_FW_VERSION) => Command::ReadFwVersion,
            (REQUEST_TYPE_READ, OPCODE_READ_EVTLOG_ENABLE) => Command::ReadEventLogEnable,
            (REQUEST_TYPE_READ, OPCODE_READ_CONFIG) => Command::ReadConfig,
            (REQUEST_TYPE_WRITE, OPCODE_WRITE_EVTLOG_ENABLE) => Command::WriteEventLogEnable,
            (REQUEST_TYPE_WRITE, OPCODE_WRITE_CONFIG) => Command::WriteConfig,
            (REQUEST_TYPE_WRITE, OPCODE_WRITE_RESET_CONFIG) => Command::WriteResetConfig,
            (REQUEST_TYPE_WRITE, OPCODE_WRITE_ADC_VOLTAGE_CALIBRATION) => {
                Command::WriteVoltageCalibration
            }
            _ => return None,
        };
        Some(command)
    }

    /// Check if this is a read request
    pub fn is_read(&self) -> bool {
        self.request_type() == REQUEST_TYPE_READ
    }

    /// Suggested response timeout in milliseconds
    ///
    /// At 1200 baud a full configuration record takes well over a second
    /// on the wire, and the firmware erases eeprom before writing.
    pub fn timeout_ms(&self) -> u64 {
        match self {
            Command::ReadConfig | Command::WriteConfig => 5000,
            Command::WriteResetConfig => 3000,
            _ => 1000,
        }
    }
}
