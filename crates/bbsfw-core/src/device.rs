//! Controller identity
//!
//! What the firmware reports about itself during the connection handshake.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Motor controller hardware the firmware was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ControllerType {
    /// Firmware did not report a controller, or reported one this tool doesn't know
    #[default]
    Unknown,
    /// Bafang BBSHD
    Bbshd,
    /// Bafang BBS01/BBS02
    Bbs02,
    /// Tongsheng TSDZ2
    Tsdz2,
}

impl ControllerType {
    /// Map the controller-model byte of the firmware version response
    pub fn from_byte(value: u8) -> Self {
        match value {
            1 => ControllerType::Bbshd,
            2 => ControllerType::Bbs02,
            3 => ControllerType::Tsdz2,
            _ => ControllerType::Unknown,
        }
    }

    /// Upper limit for the configurable battery current
    pub fn max_current_limit_amps(&self) -> u8 {
        match self {
            ControllerType::Bbshd => 36,
            _ => 33,
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerType::Unknown => "Unknown",
            ControllerType::Bbshd => "BBSHD",
            ControllerType::Bbs02 => "BBS02",
            ControllerType::Tsdz2 => "TSDZ2",
        };
        f.write_str(name)
    }
}

/// Identity negotiated with a connected controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Controller hardware
    pub controller: ControllerType,
    /// Firmware version as "major.minor.patch"
    pub firmware_version: String,
    /// Configuration record format understood by the firmware
    pub config_version: u8,
}
