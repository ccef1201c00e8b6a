//! Firmware event log
//!
//! The firmware streams event codes, optionally followed by a signed 16-bit
//! value, once the event log has been enabled over the link. Each entry is
//! turned into a severity and a human-readable message here.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an event log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Event codes emitted by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCode {
    MotorInitOk,
    ConfigReadDone,
    ConfigReset,
    ConfigWriteDone,
    ConfigReadBegin,
    ConfigWriteBegin,
    PstateReadBegin,
    PstateReadDone,
    PstateWriteBegin,
    PstateWriteDone,

    ErrorInitMotor,
    ErrorChangeTargetSpeed,
    ErrorChangeTargetCurrent,
    ErrorReadMotorStatus,
    ErrorReadMotorCurrent,
    ErrorReadMotorVoltage,
    ErrorEepromRead,
    ErrorEepromWrite,
    ErrorEepromErase,
    ErrorEepromVerifyVersion,
    ErrorEepromVerifyChecksum,
    ErrorThrottleLowLimit,
    ErrorThrottleHighLimit,
    ErrorWatchdogTriggered,
    ErrorExtcomChecksum,
    ErrorExtcomDiscard,

    DataTargetCurrent,
    DataTargetSpeed,
    DataMotorStatus,
    DataAssistLevel,
    DataOperationMode,
    DataWheelSpeedPpm,
    DataLights,
    DataTemperature,
    DataThermalLimiting,
    DataSpeedLimiting,
    DataMaxCurrentAdcRequest,
    DataMaxCurrentAdcResponse,
    DataMainLoopTime,
    DataThrottleAdc,
    DataLvcLimiting,
    DataShiftSensor,
    DataBbshdThermistor,
    DataVoltage,
    DataCalibrateVoltage,
    DataTorqueAdc,
    DataTorqueAdcCalibrated,
}

impl EventCode {
    /// Look up a raw event code
    pub fn from_u8(code: u8) -> Option<Self> {
        use EventCode::*;
        let event = match code {
            1 => MotorInitOk,
            2 => ConfigReadDone,
            3 => ConfigReset,
            4 => ConfigWriteDone,
            5 => ConfigReadBegin,
            6 => ConfigWriteBegin,
            7 => PstateReadBegin,
            8 => PstateReadDone,
            9 => PstateWriteBegin,
            10 => PstateWriteDone,

            64 => ErrorInitMotor,
            65 => ErrorChangeTargetSpeed,
            66 => ErrorChangeTargetCurrent,
            67 => ErrorReadMotorStatus,
            68 => ErrorReadMotorCurrent,
            69 => ErrorReadMotorVoltage,
            70 => ErrorEepromRead,
            71 => ErrorEepromWrite,
            72 => ErrorEepromErase,
            73 => ErrorEepromVerifyVersion,
            74 => ErrorEepromVerifyChecksum,
            75 => ErrorThrottleLowLimit,
            76 => ErrorThrottleHighLimit,
            77 => ErrorWatchdogTriggered,
            78 => ErrorExtcomChecksum,
            79 => ErrorExtcomDiscard,

            128 => DataTargetCurrent,
            129 => DataTargetSpeed,
            130 => DataMotorStatus,
            131 => DataAssistLevel,
            132 => DataOperationMode,
            133 => DataWheelSpeedPpm,
            134 => DataLights,
            135 => DataTemperature,
            136 => DataThermalLimiting,
            137 => DataSpeedLimiting,
            138 => DataMaxCurrentAdcRequest,
            139 => DataMaxCurrentAdcResponse,
            140 => DataMainLoopTime,
            141 => DataThrottleAdc,
            142 => DataLvcLimiting,
            143 => DataShiftSensor,
            144 => DataBbshdThermistor,
            145 => DataVoltage,
            146 => DataCalibrateVoltage,
            147 => DataTorqueAdc,
            148 => DataTorqueAdcCalibrated,
            _ => return None,
        };
        Some(event)
    }
}

/// Severity band of a raw code, before per-event overrides
fn level_for_code(code: u8) -> LogLevel {
    if (64..128).contains(&code) {
        LogLevel::Error
    } else {
        LogLevel::Info
    }
}

/// A single event received from the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Time the entry was received
    pub timestamp: DateTime<Local>,
    /// Raw event code
    pub code: u8,
    /// Optional payload of data events
    pub data: Option<i16>,
    /// Derived severity
    pub level: LogLevel,
    /// Human-readable description
    pub message: String,
}

impl EventLogEntry {
    /// Create an entry timestamped now
    pub fn new(code: u8, data: Option<i16>) -> Self {
        Self::with_timestamp(Local::now(), code, data)
    }

    /// Create an entry with an explicit timestamp
    pub fn with_timestamp(timestamp: DateTime<Local>, code: u8, data: Option<i16>) -> Self {
        let (level, message) = describe(code, data);
        Self {
            timestamp,
            code,
            data,
            level,
            message,
        }
    }

    /// Typed event code, if known
    pub fn event(&self) -> Option<EventCode> {
        EventCode::from_u8(self.code)
    }
}

impl fmt::Display for EventLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level,
            self.message
        )
    }
}

fn describe(code: u8, data: Option<i16>) -> (LogLevel, String) {
    use EventCode::*;

    let mut level = level_for_code(code);
    let value = data.unwrap_or(0);

    let Some(event) = EventCode::from_u8(code) else {
        let message = match data {
            Some(v) => format!("Unknown ({})", v),
            None => "Unknown".to_string(),
        };
        return (level, message);
    };

    let message = match event {
        MotorInitOk => "Motor initialization successful.".to_string(),
        ConfigReadDone => "Successfully read configuration from eeprom.".to_string(),
        ConfigReset => {
            level = LogLevel::Warning;
            "Configuration reset performed.".to_string()
        }
        ConfigWriteDone => "Configuration written to eeprom.".to_string(),
        ConfigReadBegin => "Reading configuration from eeprom.".to_string(),
        ConfigWriteBegin => "Writing configuration to eeprom.".to_string(),
        PstateReadBegin => "Reading persistent state from eeprom.".to_string(),
        PstateReadDone => "Successfully read persistent state from eeprom.".to_string(),
        PstateWriteBegin => "Writing persistent state to eeprom.".to_string(),
        PstateWriteDone => "Persistent state written to eeprom.".to_string(),

        ErrorInitMotor => "Failed to perform motor controller initialization.".to_string(),
        ErrorChangeTargetSpeed => {
            "Failed to set motor target speed on motor controller.".to_string()
        }
        ErrorChangeTargetCurrent => {
            "Failed to set motor target current on motor controller.".to_string()
        }
        ErrorReadMotorStatus => "Failed to read status from motor controller.".to_string(),
        ErrorReadMotorCurrent => "Failed to read current from motor controller.".to_string(),
        ErrorReadMotorVoltage => "Failed to read voltage from motor controller.".to_string(),
        ErrorEepromRead => "Failed to read from eeprom.".to_string(),
        ErrorEepromWrite => "Failed to write to eeprom.".to_string(),
        ErrorEepromErase => "Failed to erase eeprom before writing.".to_string(),
        ErrorEepromVerifyVersion => "Data read from eeprom is of the wrong version.".to_string(),
        ErrorEepromVerifyChecksum => {
            "Failed to verify checksum on data read from eeprom.".to_string()
        }
        ErrorThrottleLowLimit => {
            "Throttle signal below low limit, throttle disabled until restart.".to_string()
        }
        ErrorThrottleHighLimit => {
            "Throttle signal above high limit, throttle disabled until restart.".to_string()
        }
        ErrorWatchdogTriggered => "Controller was reset by watchdog.".to_string(),
        ErrorExtcomChecksum => "Checksum error on message received from tool.".to_string(),
        ErrorExtcomDiscard => "Discarded unrecognized data received from tool.".to_string(),

        DataTargetCurrent => format!("Motor target current changed to {}%.", value),
        DataTargetSpeed => format!(
            "Motor target speed changed to {}%.",
            i32::from(value) * 100 / 256
        ),
        DataMotorStatus => {
            level = if value != 0 {
                LogLevel::Error
            } else {
                LogLevel::Info
            };
            format!("Motor controller status changed to 0x{:X}.", value as u16)
        }
        DataAssistLevel => format!("Assist level changed to {}.", value),
        DataOperationMode => format!("Operation mode changed to {}.", value),
        DataWheelSpeedPpm => format!("Max wheel speed changed to {} rpm.", value),
        DataLights => format!("Lights status changed to {}.", value),
        DataTemperature => format!("Motor controller temperature changed to {}C.", value),
        DataThermalLimiting => {
            if value != 0 {
                level = LogLevel::Warning;
                "Thermal limit reached, power reduced.".to_string()
            } else {
                "Thermal limiting removed.".to_string()
            }
        }
        DataSpeedLimiting => {
            if value != 0 {
                "Speed limiting activated.".to_string()
            } else {
                "Speed limiting deactivated.".to_string()
            }
        }
        DataMaxCurrentAdcRequest => format!(
            "Requesting to configure max current on motor controller mcu, adc={}.",
            value
        ),
        DataMaxCurrentAdcResponse => format!(
            "Max current configured on motor controller mcu, response was adc={}.",
            value
        ),
        DataMainLoopTime => format!("Main loop time {} ms.", value),
        DataThrottleAdc => format!("Throttle adc changed to {}.", value),
        DataLvcLimiting => {
            if value != 0 {
                level = LogLevel::Warning;
                "Low voltage limit reached, power reduced.".to_string()
            } else {
                "Low voltage limiting removed.".to_string()
            }
        }
        DataShiftSensor => {
            if value != 0 {
                "Shift sensor activated, motor power interrupted.".to_string()
            } else {
                "Shift sensor deactivated.".to_string()
            }
        }
        DataBbshdThermistor => format!("BBSHD motor thermistor adc changed to {}.", value),
        DataVoltage => format!("Battery voltage changed to {:.2}V.", f32::from(value) / 100.0),
        DataCalibrateVoltage => format!("Battery voltage calibration offset set to {}.", value),
        DataTorqueAdc => format!("Torque sensor adc changed to {}.", value),
        DataTorqueAdcCalibrated => format!("Calibrated torque sensor adc changed to {}.", value),
    };

    (level, message)
}
