//! Inbound messages
//!
//! Typed forms of the frames the firmware sends back.

/// Firmware identity reported in response to a version read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Configuration layout version the firmware reads and writes
    pub config_version: u8,
    /// Controller model byte, absent from legacy firmware
    pub controller: Option<u8>,
}

impl FirmwareVersion {
    /// Wire length of a version response for the given firmware version
    pub fn frame_len(major: u8, minor: u8) -> usize {
        if Self::has_controller_byte(major, minor) {
            8
        } else {
            7
        }
    }

    /// Firmware 1.3 and later append the controller model
    pub fn has_controller_byte(major: u8, minor: u8) -> bool {
        major > 1 || (major == 1 && minor >= 3)
    }

    /// "major.minor.patch"
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A complete, checksum-verified message from the firmware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ReadFwVersion(FirmwareVersion),
    ReadEventLogAck { enabled: bool },
    /// Raw configuration record, version and size already checked
    ReadConfig { version: u8, payload: Vec<u8> },
    WriteEventLogAck { enabled: bool },
    WriteConfigAck { ok: bool },
    WriteResetConfigAck { ok: bool },
    WriteVoltageCalibrationAck,
    EventLog { code: u8, data: Option<i16> },
}
