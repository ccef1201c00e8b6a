//! Configuration record codec
//!
//! The firmware stores its configuration as a packed struct and transfers it
//! verbatim, prefixed by a version byte and a length byte. Each firmware
//! generation added fields, so every version has exactly one fixed layout:
//!
//! | version | size | adds                                                   |
//! |---------|------|--------------------------------------------------------|
//! | 1       | 122  | base record, 5-byte assist levels                      |
//! | 2       | 126  | shift/temperature sensors, PAS keep-current            |
//! | 3       | 150  | shift interrupt, push-walk temperature, torque factor  |
//!
//! 16-bit fields are little-endian. Only the newest layout can be encoded.

use byteorder::{ByteOrder, LittleEndian};

use super::{
    AssistFlags, AssistLevel, AssistModeSelect, CodecError, Configuration, TemperatureSensor,
};

/// Newest configuration layout, the only one that can be written
pub const CURRENT_VERSION: u8 = 3;

/// Layout versions that can be decoded
pub const SUPPORTED_VERSIONS: [u8; 3] = [1, 2, 3];

const SIZE_V1: usize = 122;
const SIZE_V2: usize = 126;
const SIZE_V3: usize = 150;

/// Exact byte size of a layout version, `None` if the version is unknown
pub fn byte_size(version: u8) -> Option<usize> {
    match version {
        1 => Some(SIZE_V1),
        2 => Some(SIZE_V2),
        3 => Some(SIZE_V3),
        _ => None,
    }
}

/// Decode a configuration record of the given layout version
pub fn decode(version: u8, data: &[u8]) -> Result<Configuration, CodecError> {
    let expected = byte_size(version).ok_or(CodecError::UnsupportedVersion(version))?;
    if data.len() != expected {
        return Err(CodecError::SizeMismatch {
            version,
            expected,
            actual: data.len(),
        });
    }

    let mut reader = RecordReader::new(data);
    let config = match version {
        1 => read_v1(&mut reader),
        2 => read_v2(&mut reader),
        _ => read_v3(&mut reader),
    };

    debug_assert_eq!(reader.position(), expected);
    Ok(config)
}

/// Encode a configuration using the newest layout
pub fn encode(config: &Configuration) -> Vec<u8> {
    write_v3(config)
}

/// Encode a configuration for a specific layout version
///
/// Older layouts cannot be produced; firmware expecting one must be
/// upgraded before its configuration can be written.
pub fn encode_version(config: &Configuration, version: u8) -> Result<Vec<u8>, CodecError> {
    if version != CURRENT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(write_v3(config))
}

/// Values for fields that older layouts don't carry
fn legacy_defaults() -> Configuration {
    Configuration {
        use_shift_sensor: true,
        use_temperature_sensor: TemperatureSensor::All,
        pas_keep_current_percent: 100,
        pas_keep_current_cadence_rpm: 255,
        shift_interrupt_duration_ms: 600,
        shift_interrupt_current_threshold_percent: 10,
        show_temperature_on_push_walk: false,
        ..Default::default()
    }
}

fn read_v1(r: &mut RecordReader<'_>) -> Configuration {
    let mut c = legacy_defaults();

    c.use_freedom_units = r.bool();
    read_power(r, &mut c);

    c.use_display = r.bool();
    c.use_speed_sensor = r.bool();
    c.use_push_walk = r.bool();

    read_speed_sensor(r, &mut c);

    c.pas_start_delay_pulses = r.u8();
    c.pas_stop_delay_milliseconds = u16::from(r.u8()) * 10;

    read_throttle(r, &mut c);

    c.assist_mode_select = AssistModeSelect::from_byte(r.u8());
    c.assist_startup_level = r.u8();
    read_assist_levels(r, &mut c, false);
    c
}

fn read_v2(r: &mut RecordReader<'_>) -> Configuration {
    let mut c = legacy_defaults();

    c.use_freedom_units = r.bool();
    read_power(r, &mut c);
    read_externals(r, &mut c);
    read_speed_sensor(r, &mut c);
    read_pas(r, &mut c);
    read_throttle(r, &mut c);

    c.assist_mode_select = AssistModeSelect::from_byte(r.u8());
    c.assist_startup_level = r.u8();
    read_assist_levels(r, &mut c, false);
    c
}

fn read_v3(r: &mut RecordReader<'_>) -> Configuration {
    let mut c = Configuration::default();

    c.use_freedom_units = r.bool();
    read_power(r, &mut c);
    read_externals(r, &mut c);
    read_speed_sensor(r, &mut c);
    read_pas(r, &mut c);
    read_throttle(r, &mut c);

    c.shift_interrupt_duration_ms = r.u16();
    c.shift_interrupt_current_threshold_percent = r.u8();
    c.show_temperature_on_push_walk = r.bool();

    c.assist_mode_select = AssistModeSelect::from_byte(r.u8());
    c.assist_startup_level = r.u8();
    read_assist_levels(r, &mut c, true);
    c
}

fn read_power(r: &mut RecordReader<'_>, c: &mut Configuration) {
    c.max_current_amps = r.u8();
    c.current_ramp_amps_s = r.u8();
    c.max_battery_volts = f32::from(r.u16()) / 100.0;
    c.low_cutoff_volts = r.u8();
    c.max_speed_kph = r.u8();
}

fn read_externals(r: &mut RecordReader<'_>, c: &mut Configuration) {
    c.use_display = r.bool();
    c.use_speed_sensor = r.bool();
    c.use_shift_sensor = r.bool();
    c.use_push_walk = r.bool();
    c.use_temperature_sensor = TemperatureSensor::from_byte(r.u8());
}

fn read_speed_sensor(r: &mut RecordReader<'_>, c: &mut Configuration) {
    c.wheel_size_inch = f32::from(r.u16()) / 10.0;
    c.num_wheel_sensor_signals = r.u8();
}

fn read_pas(r: &mut RecordReader<'_>, c: &mut Configuration) {
    c.pas_start_delay_pulses = r.u8();
    c.pas_stop_delay_milliseconds = u16::from(r.u8()) * 10;
    c.pas_keep_current_percent = r.u8();
    c.pas_keep_current_cadence_rpm = r.u8();
}

fn read_throttle(r: &mut RecordReader<'_>, c: &mut Configuration) {
    c.throttle_start_millivolts = r.u16();
    c.throttle_end_millivolts = r.u16();
    c.throttle_start_percent = r.u8();
}

fn read_assist_levels(r: &mut RecordReader<'_>, c: &mut Configuration, with_torque: bool) {
    for table in [&mut c.standard_assist_levels, &mut c.sport_assist_levels] {
        for level in table.iter_mut() {
            *level = AssistLevel {
                flags: AssistFlags(r.u8()),
                max_current_percent: r.u8(),
                max_throttle_percent: r.u8(),
                max_cadence_percent: r.u8(),
                max_speed_percent: r.u8(),
                torque_amplification_factor: if with_torque {
                    f32::from(r.u8()) / 10.0
                } else {
                    0.0
                },
            };
        }
    }
}

fn write_v3(c: &Configuration) -> Vec<u8> {
    let mut w = RecordWriter::with_capacity(SIZE_V3);

    w.bool(c.use_freedom_units);

    w.u8(c.max_current_amps);
    w.u8(c.current_ramp_amps_s);
    w.u16((c.max_battery_volts * 100.0).round() as u16);
    w.u8(c.low_cutoff_volts);
    w.u8(c.max_speed_kph);

    w.bool(c.use_display);
    w.bool(c.use_speed_sensor);
    w.bool(c.use_shift_sensor);
    w.bool(c.use_push_walk);
    w.u8(c.use_temperature_sensor.to_byte());

    w.u16((c.wheel_size_inch * 10.0).round() as u16);
    w.u8(c.num_wheel_sensor_signals);

    w.u8(c.pas_start_delay_pulses);
    w.u8((c.pas_stop_delay_milliseconds / 10).min(u16::from(u8::MAX)) as u8);
    w.u8(c.pas_keep_current_percent);
    w.u8(c.pas_keep_current_cadence_rpm);

    w.u16(c.throttle_start_millivolts);
    w.u16(c.throttle_end_millivolts);
    w.u8(c.throttle_start_percent);

    w.u16(c.shift_interrupt_duration_ms);
    w.u8(c.shift_interrupt_current_threshold_percent);
    w.bool(c.show_temperature_on_push_walk);

    w.u8(c.assist_mode_select.to_byte());
    w.u8(c.assist_startup_level);

    for table in [&c.standard_assist_levels, &c.sport_assist_levels] {
        for level in table.iter() {
            w.u8(level.flags.bits());
            w.u8(level.max_current_percent);
            w.u8(level.max_throttle_percent);
            w.u8(level.max_cadence_percent);
            w.u8(level.max_speed_percent);
            w.u8((level.torque_amplification_factor * 10.0).round() as u8);
        }
    }

    debug_assert_eq!(w.len(), SIZE_V3);
    w.into_inner()
}

/// Sequential reader over a record whose length was already checked
struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn u8(&mut self) -> u8 {
        let value = self.data[self.pos];
        self.pos += 1;
        value
    }

    fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    fn u16(&mut self) -> u16 {
        let value = LittleEndian::read_u16(&self.data[self.pos..self.pos + 2]);
        self.pos += 2;
        value
    }
}

struct RecordWriter {
    data: Vec<u8>,
}

impl RecordWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn u8(&mut self, value: u8) {
        self.data.push(value);
    }

    fn bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    fn u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.data.extend_from_slice(&bytes);
    }

    fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
