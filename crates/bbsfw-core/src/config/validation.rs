//! Range validation of configuration records
//!
//! Every numeric field has a fixed inclusive range. Validation runs on a
//! fully decoded record before it is written to a controller.

use super::{AssistLevel, Configuration, ValidationError};
use crate::device::ControllerType;

/// Lowest configurable battery current limit
const MIN_CURRENT_AMPS: f64 = 5.0;

impl Configuration {
    /// Check every field, returning the first violation
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_for(ControllerType::Unknown)
    }

    /// Check every field against the limits of a specific controller
    pub fn validate_for(&self, controller: ControllerType) -> Result<(), ValidationError> {
        match self.violations(controller).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// All range violations, in field order
    pub fn validate_all(&self) -> Vec<ValidationError> {
        self.violations(ControllerType::Unknown)
    }

    fn violations(&self, controller: ControllerType) -> Vec<ValidationError> {
        let max_current = f64::from(controller.max_current_limit_amps());

        let mut checks = vec![
            check("Max Current (A)", self.max_current_amps, MIN_CURRENT_AMPS, max_current),
            check("Current Ramp (A/s)", self.current_ramp_amps_s, 1.0, 255.0),
            check("Max Battery Voltage (V)", self.max_battery_volts, 1.0, 100.0),
            check("Low Voltage Cut Off (V)", self.low_cutoff_volts, 1.0, 100.0),
            check("Max Speed (km/h)", self.max_speed_kph, 0.0, 100.0),
            check("Wheel Size (inch)", self.wheel_size_inch, 10.0, 40.0),
            check("Wheel Sensor Signals", self.num_wheel_sensor_signals, 1.0, 10.0),
            check("Pas Delay (pulses)", self.pas_start_delay_pulses, 0.0, 24.0),
            check("Pas Stop Delay (ms)", self.pas_stop_delay_milliseconds, 50.0, 1000.0),
            check("Pas Keep Current (%)", self.pas_keep_current_percent, 10.0, 100.0),
            check("Throttle Start (mV)", self.throttle_start_millivolts, 200.0, 2500.0),
            check("Throttle End (mV)", self.throttle_end_millivolts, 2500.0, 5000.0),
            check("Throttle Start (%)", self.throttle_start_percent, 0.0, 100.0),
            check(
                "Shift Interrupt Duration (ms)",
                self.shift_interrupt_duration_ms,
                50.0,
                2000.0,
            ),
            check(
                "Shift Interrupt Current Threshold (%)",
                self.shift_interrupt_current_threshold_percent,
                0.0,
                100.0,
            ),
            check("Assist Startup Level", self.assist_startup_level, 0.0, 9.0),
        ];

        for (mode, levels) in [
            ("Standard", &self.standard_assist_levels),
            ("Sport", &self.sport_assist_levels),
        ] {
            for (index, level) in levels.iter().enumerate() {
                checks.extend(check_level(mode, index, level));
            }
        }

        checks.into_iter().flatten().collect()
    }
}

fn check_level(mode: &str, index: usize, level: &AssistLevel) -> Vec<Option<ValidationError>> {
    [
        ("Current", level.max_current_percent),
        ("Throttle", level.max_throttle_percent),
        ("Cadence", level.max_cadence_percent),
        ("Speed", level.max_speed_percent),
    ]
    .into_iter()
    .map(|(name, value)| {
        let field = format!("{} Assist Level {} Max {} (%)", mode, index, name);
        check(&field, value, 0.0, 100.0)
    })
    .collect()
}

fn check(field: &str, value: impl Into<f64>, min: f64, max: f64) -> Option<ValidationError> {
    let value = value.into();
    if (min..=max).contains(&value) {
        None
    } else {
        Some(ValidationError {
            field: field.to_string(),
            min,
            max,
            value,
        })
    }
}
