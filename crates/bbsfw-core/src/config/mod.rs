//! Controller configuration
//!
//! The tunable-parameter record stored in the controller's eeprom, its
//! versioned binary layouts, range validation and JSON file persistence.

pub mod codec;
mod error;
mod file;
mod validation;

pub use codec::{byte_size, decode, encode, encode_version, CURRENT_VERSION, SUPPORTED_VERSIONS};
pub use error::{CodecError, ValidationError};

use serde::{Deserialize, Serialize};

/// Number of assist levels per operation mode
pub const NUM_ASSIST_LEVELS: usize = 10;

/// How the display's assist buttons select the operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AssistModeSelect {
    /// Sport mode is never selected
    #[default]
    Off,
    /// Standard/sport selected with display mode button
    Standard,
    /// Sport mode active while lights are on
    Lights,
    /// Sport mode toggled with lights button while in assist level 0
    Pas0AndLights,
}

impl AssistModeSelect {
    pub(crate) fn from_byte(value: u8) -> Self {
        match value {
            0x01 => AssistModeSelect::Standard,
            0x02 => AssistModeSelect::Lights,
            0x03 => AssistModeSelect::Pas0AndLights,
            _ => AssistModeSelect::Off,
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            AssistModeSelect::Off => 0x00,
            AssistModeSelect::Standard => 0x01,
            AssistModeSelect::Lights => 0x02,
            AssistModeSelect::Pas0AndLights => 0x03,
        }
    }
}

/// Which temperature sensors the controller should monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TemperatureSensor {
    #[default]
    Disabled,
    Controller,
    Motor,
    All,
}

impl TemperatureSensor {
    const CONTROLLER: u8 = 0x01;
    const MOTOR: u8 = 0x02;

    pub(crate) fn from_byte(value: u8) -> Self {
        match (value & Self::CONTROLLER != 0, value & Self::MOTOR != 0) {
            (true, true) => TemperatureSensor::All,
            (true, false) => TemperatureSensor::Controller,
            (false, true) => TemperatureSensor::Motor,
            (false, false) => TemperatureSensor::Disabled,
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            TemperatureSensor::Disabled => 0,
            TemperatureSensor::Controller => Self::CONTROLLER,
            TemperatureSensor::Motor => Self::MOTOR,
            TemperatureSensor::All => Self::CONTROLLER | Self::MOTOR,
        }
    }
}

/// Assist type flags of an assist level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AssistFlags(pub u8);

impl AssistFlags {
    pub const DISABLED: AssistFlags = AssistFlags(0x00);
    pub const PAS: AssistFlags = AssistFlags(0x01);
    pub const THROTTLE: AssistFlags = AssistFlags(0x02);
    pub const CRUISE: AssistFlags = AssistFlags(0x04);
    /// PAS where the throttle sets the power level
    pub const PAS_VARIABLE: AssistFlags = AssistFlags(0x08);
    /// PAS driven by the torque sensor reading
    pub const PAS_TORQUE: AssistFlags = AssistFlags(0x10);

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: AssistFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_disabled(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for AssistFlags {
    type Output = AssistFlags;

    fn bitor(self, rhs: AssistFlags) -> AssistFlags {
        AssistFlags(self.0 | rhs.0)
    }
}

/// One assist level entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AssistLevel {
    pub flags: AssistFlags,
    pub max_current_percent: u8,
    pub max_throttle_percent: u8,
    pub max_cadence_percent: u8,
    pub max_speed_percent: u8,
    /// Motor power per unit of rider power (torque sensor PAS)
    pub torque_amplification_factor: f32,
}

/// Complete controller configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Configuration {
    // hmi
    pub use_freedom_units: bool,

    // power
    pub max_current_amps: u8,
    pub current_ramp_amps_s: u8,
    pub max_battery_volts: f32,
    pub low_cutoff_volts: u8,
    pub max_speed_kph: u8,

    // externals
    pub use_display: bool,
    pub use_speed_sensor: bool,
    pub use_shift_sensor: bool,
    pub use_push_walk: bool,
    pub use_temperature_sensor: TemperatureSensor,

    // speed sensor
    pub wheel_size_inch: f32,
    pub num_wheel_sensor_signals: u8,

    // pas options
    pub pas_start_delay_pulses: u8,
    pub pas_stop_delay_milliseconds: u16,
    pub pas_keep_current_percent: u8,
    pub pas_keep_current_cadence_rpm: u8,

    // throttle options
    pub throttle_start_millivolts: u16,
    pub throttle_end_millivolts: u16,
    pub throttle_start_percent: u8,

    // shift interrupt options
    pub shift_interrupt_duration_ms: u16,
    pub shift_interrupt_current_threshold_percent: u8,

    // misc
    pub show_temperature_on_push_walk: bool,

    // assist levels
    pub assist_mode_select: AssistModeSelect,
    pub assist_startup_level: u8,
    pub standard_assist_levels: [AssistLevel; NUM_ASSIST_LEVELS],
    pub sport_assist_levels: [AssistLevel; NUM_ASSIST_LEVELS],
}

impl Configuration {
    /// The configuration a controller loads after a configuration reset
    pub fn factory_defaults() -> Self {
        const CURRENT_LIMITS: [u8; 9] = [7, 10, 14, 19, 26, 36, 50, 70, 98];

        let mut standard = [AssistLevel::default(); NUM_ASSIST_LEVELS];
        for (level, current) in standard.iter_mut().skip(1).zip(CURRENT_LIMITS) {
            *level = AssistLevel {
                flags: AssistFlags::PAS | AssistFlags::THROTTLE,
                max_current_percent: current,
                max_throttle_percent: 100,
                max_cadence_percent: 100,
                max_speed_percent: 100,
                torque_amplification_factor: 0.0,
            };
        }

        Self {
            use_freedom_units: false,
            max_current_amps: 20,
            current_ramp_amps_s: 10,
            max_battery_volts: 54.6,
            low_cutoff_volts: 42,
            max_speed_kph: 100,
            use_display: true,
            use_speed_sensor: true,
            use_shift_sensor: true,
            use_push_walk: true,
            use_temperature_sensor: TemperatureSensor::All,
            wheel_size_inch: 28.0,
            num_wheel_sensor_signals: 1,
            pas_start_delay_pulses: 5,
            pas_stop_delay_milliseconds: 200,
            pas_keep_current_percent: 60,
            pas_keep_current_cadence_rpm: 40,
            throttle_start_millivolts: 900,
            throttle_end_millivolts: 3600,
            throttle_start_percent: 1,
            shift_interrupt_duration_ms: 600,
            shift_interrupt_current_threshold_percent: 10,
            show_temperature_on_push_walk: false,
            assist_mode_select: AssistModeSelect::Off,
            assist_startup_level: 3,
            standard_assist_levels: standard,
            sport_assist_levels: [AssistLevel::default(); NUM_ASSIST_LEVELS],
        }
    }

    /// Assist levels of the given operation mode (0 = standard, 1 = sport)
    pub fn assist_levels(&self, mode: usize) -> Option<&[AssistLevel; NUM_ASSIST_LEVELS]> {
        match mode {
            0 => Some(&self.standard_assist_levels),
            1 => Some(&self.sport_assist_levels),
            _ => None,
        }
    }
}
