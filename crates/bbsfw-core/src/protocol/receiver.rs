//! Incremental frame parsing
//!
//! Bytes arrive from the serial link in arbitrary fragments. The receiver
//! appends them to its buffer and pulls out every complete frame, leaving
//! partial ones in place for the next call.
//!
//! Recovery rules:
//! - unknown leading byte, unknown opcode or an unsupported configuration
//!   version/size: the whole buffer is dropped
//! - checksum mismatch: only the frame's own bytes are dropped
//! - a gap longer than the stale threshold before new bytes: the old
//!   buffer is dropped
//! - a buffer that grows past [`MAX_BUFFER_SIZE`] without yielding a frame
//!   is dropped

use byteorder::{BigEndian, ByteOrder};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::commands::{
    OPCODE_READ_CONFIG, OPCODE_READ_EVTLOG_ENABLE, OPCODE_READ_FW_VERSION,
    OPCODE_WRITE_ADC_VOLTAGE_CALIBRATION, OPCODE_WRITE_CONFIG, OPCODE_WRITE_EVTLOG_ENABLE,
    OPCODE_WRITE_RESET_CONFIG,
};
use super::frame::verify_checksum;
use super::message::{FirmwareVersion, Message};
use super::{
    EVENT_LOG, EVENT_LOG_DATA, MAX_BUFFER_SIZE, REQUEST_TYPE_READ, REQUEST_TYPE_WRITE,
};
use crate::config;

/// Outcome of parsing the head of the buffer
#[derive(Debug, PartialEq)]
enum Parse {
    /// A verified message spanning the given number of bytes
    Complete(Message, usize),
    /// More bytes are needed
    Incomplete,
    /// Frame of the given length failed its checksum
    Corrupt(usize),
    /// Head of the buffer isn't a frame this tool understands
    Unrecognized,
}

/// Receive buffer and parser state
#[derive(Debug)]
pub struct FrameReceiver {
    buffer: Vec<u8>,
    last_byte_at: Option<Instant>,
    stale_after: Duration,
}

impl FrameReceiver {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_BUFFER_SIZE),
            last_byte_at: None,
            stale_after,
        }
    }

    /// Append newly received bytes and return every complete message
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Message> {
        self.feed_at(bytes, Instant::now())
    }

    /// Like [`FrameReceiver::feed`], with an explicit arrival time
    pub fn feed_at(&mut self, bytes: &[u8], now: Instant) -> Vec<Message> {
        if bytes.is_empty() {
            return Vec::new();
        }

        if let Some(last) = self.last_byte_at {
            let gap = now.saturating_duration_since(last);
            if !self.buffer.is_empty() && gap > self.stale_after {
                debug!(
                    "Discarding {} stale bytes after {}ms gap",
                    self.buffer.len(),
                    gap.as_millis()
                );
                self.buffer.clear();
            }
        }
        self.last_byte_at = Some(now);
        self.buffer.extend_from_slice(bytes);

        let messages = self.drain();

        if self.buffer.len() > MAX_BUFFER_SIZE {
            warn!(
                "Receive buffer overflow, discarding {} bytes",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        messages
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_byte_at = None;
    }

    /// Number of buffered bytes not yet forming a complete frame
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();

        while !self.buffer.is_empty() {
            match parse(&self.buffer) {
                Parse::Complete(message, len) => {
                    trace!("Received {:02x?}", &self.buffer[..len]);
                    self.buffer.drain(..len);
                    messages.push(message);
                }
                Parse::Incomplete => break,
                Parse::Corrupt(len) => {
                    warn!(
                        "Checksum mismatch, discarding {} byte frame {:02x?}",
                        len,
                        &self.buffer[..len]
                    );
                    self.buffer.drain(..len);
                }
                Parse::Unrecognized => {
                    debug!(
                        "Unrecognized data, discarding {} bytes starting {:02x?}",
                        self.buffer.len(),
                        &self.buffer[..self.buffer.len().min(4)]
                    );
                    self.buffer.clear();
                }
            }
        }

        messages
    }
}

fn parse(buf: &[u8]) -> Parse {
    match buf[0] {
        REQUEST_TYPE_READ => parse_read_response(buf),
        REQUEST_TYPE_WRITE => parse_write_response(buf),
        EVENT_LOG => parse_frame(buf, 3, |f| Message::EventLog {
            code: f[1],
            data: None,
        }),
        EVENT_LOG_DATA => parse_frame(buf, 5, |f| Message::EventLog {
            code: f[1],
            data: Some(BigEndian::read_i16(&f[2..4])),
        }),
        _ => Parse::Unrecognized,
    }
}

fn parse_read_response(buf: &[u8]) -> Parse {
    let Some(&opcode) = buf.get(1) else {
        return Parse::Incomplete;
    };

    match opcode {
        OPCODE_READ_FW_VERSION => {
            if buf.len() < 4 {
                return Parse::Incomplete;
            }
            let len = FirmwareVersion::frame_len(buf[2], buf[3]);
            parse_frame(buf, len, |f| {
                Message::ReadFwVersion(FirmwareVersion {
                    major: f[2],
                    minor: f[3],
                    patch: f[4],
                    config_version: f[5],
                    controller: (len == 8).then(|| f[6]),
                })
            })
        }
        OPCODE_READ_EVTLOG_ENABLE => parse_frame(buf, 4, |f| Message::ReadEventLogAck {
            enabled: f[2] != 0,
        }),
        OPCODE_READ_CONFIG => {
            if buf.len() < 4 {
                return Parse::Incomplete;
            }
            let version = buf[2];
            let size = usize::from(buf[3]);
            if config::byte_size(version) != Some(size) {
                debug!(
                    "Unsupported configuration version {} with size {}",
                    version, size
                );
                return Parse::Unrecognized;
            }
            parse_frame(buf, 4 + size + 1, |f| Message::ReadConfig {
                version,
                payload: f[4..4 + size].to_vec(),
            })
        }
        _ => Parse::Unrecognized,
    }
}

fn parse_write_response(buf: &[u8]) -> Parse {
    let Some(&opcode) = buf.get(1) else {
        return Parse::Incomplete;
    };

    match opcode {
        OPCODE_WRITE_EVTLOG_ENABLE => parse_frame(buf, 4, |f| Message::WriteEventLogAck {
            enabled: f[2] != 0,
        }),
        OPCODE_WRITE_CONFIG => parse_frame(buf, 4, |f| Message::WriteConfigAck { ok: f[2] != 0 }),
        OPCODE_WRITE_RESET_CONFIG => {
            parse_frame(buf, 4, |f| Message::WriteResetConfigAck { ok: f[2] != 0 })
        }
        OPCODE_WRITE_ADC_VOLTAGE_CALIBRATION => {
            parse_frame(buf, 4, |_| Message::WriteVoltageCalibrationAck)
        }
        _ => Parse::Unrecognized,
    }
}

/// Check length and checksum of a fixed-size frame at the head of `buf`
fn parse_frame(buf: &[u8], len: usize, build: impl FnOnce(&[u8]) -> Message) -> Parse {
    if buf.len() < len {
        return Parse::Incomplete;
    }
    let frame = &buf[..len];
    if verify_checksum(frame) {
        Parse::Complete(build(frame), len)
    } else {
        Parse::Corrupt(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::checksum;
    use pretty_assertions::assert_eq;

    fn receiver() -> FrameReceiver {
        FrameReceiver::new(Duration::from_millis(1000))
    }

    fn with_checksum(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.push(checksum(body));
        frame
    }

    #[test]
    fn test_legacy_fw_version() {
        let mut rx = receiver();
        let messages = rx.feed(&[0x01, 0x01, 0x01, 0x02, 0x00, 0x03, 0x08]);
        assert_eq!(
            messages,
            vec![Message::ReadFwVersion(FirmwareVersion {
                major: 1,
                minor: 2,
                patch: 0,
                config_version: 3,
                controller: None,
            })]
        );
        assert!(rx.is_empty());
    }

    #[test]
    fn test_fw_version_with_controller() {
        let mut rx = receiver();
        let frame = with_checksum(&[0x01, 0x01, 0x01, 0x05, 0x02, 0x03, 0x01]);
        let messages = rx.feed(&frame);
        match messages.as_slice() {
            [Message::ReadFwVersion(version)] => {
                assert_eq!(version.controller, Some(1));
                assert_eq!(version.version_string(), "1.5.2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fw_version_waits_for_minor() {
        let mut rx = receiver();
        let frame = with_checksum(&[0x01, 0x01, 0x01, 0x05, 0x02, 0x03, 0x01]);
        assert!(rx.feed(&frame[..3]).is_empty());
        assert!(rx.feed(&frame[3..7]).is_empty());
        assert_eq!(rx.len(), 7);
        assert_eq!(rx.feed(&frame[7..]).len(), 1);
    }

    #[test]
    fn test_event_log_with_data() {
        let mut rx = receiver();
        let frame = with_checksum(&[0xed, 0x82, 0x00, 0x64]);
        assert_eq!(
            rx.feed(&frame),
            vec![Message::EventLog {
                code: 0x82,
                data: Some(100)
            }]
        );

        let negative = with_checksum(&[0xed, 0x8c, 0xff, 0xf6]);
        assert_eq!(
            rx.feed(&negative),
            vec![Message::EventLog {
                code: 0x8c,
                data: Some(-10)
            }]
        );
    }

    #[test]
    fn test_byte_at_a_time_matches_bulk() {
        let mut stream = Vec::new();
        stream.extend(with_checksum(&[0xee, 0x01]));
        stream.extend(with_checksum(&[0x02, 0xf1, 0x01]));
        stream.extend(with_checksum(&[0x01, 0x02, 0x01]));
        stream.extend(with_checksum(&[0xed, 0x83, 0x00, 0x05]));
        stream.extend(with_checksum(&[0x02, 0xf3, 0x00]));

        let bulk = receiver().feed(&stream);
        assert_eq!(bulk.len(), 5);

        let mut rx = receiver();
        let mut single = Vec::new();
        for b in &stream {
            single.extend(rx.feed(std::slice::from_ref(b)));
        }
        assert_eq!(single, bulk);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_drops_only_frame() {
        let mut rx = receiver();
        let mut stream = vec![0x02, 0xf2, 0x01, 0x00];
        stream.extend(with_checksum(&[0x02, 0xf1, 0x01]));

        assert_eq!(rx.feed(&stream), vec![Message::WriteConfigAck { ok: true }]);
    }

    #[test]
    fn test_unknown_leading_byte_drops_buffer() {
        let mut rx = receiver();
        let mut stream = vec![0x55];
        stream.extend(with_checksum(&[0x02, 0xf1, 0x01]));

        assert!(rx.feed(&stream).is_empty());
        assert!(rx.is_empty());
    }

    #[test]
    fn test_unknown_opcode_drops_buffer() {
        let mut rx = receiver();
        assert!(rx.feed(&[0x01, 0x09, 0x0a]).is_empty());
        assert!(rx.is_empty());
        assert!(rx.feed(&[0x02, 0x10]).is_empty());
        assert!(rx.is_empty());
    }

    #[test]
    fn test_read_config_frame() {
        let record = config::encode(&config::Configuration::factory_defaults());
        let mut body = vec![0x01, 0x03, 0x03, record.len() as u8];
        body.extend_from_slice(&record);
        let frame = with_checksum(&body);

        let mut rx = receiver();
        let (head, tail) = frame.split_at(60);
        assert!(rx.feed(head).is_empty());
        assert_eq!(
            rx.feed(tail),
            vec![Message::ReadConfig {
                version: 3,
                payload: record
            }]
        );
    }

    #[test]
    fn test_read_config_waits_for_header() {
        let mut rx = receiver();
        assert!(rx.feed(&[0x01, 0x03, 0x03]).is_empty());
        assert_eq!(rx.len(), 3);
    }

    #[test]
    fn test_read_config_size_mismatch_dropped() {
        let mut rx = receiver();
        assert!(rx.feed(&[0x01, 0x03, 0x03, 0x7a]).is_empty());
        assert!(rx.is_empty());
        assert!(rx.feed(&[0x01, 0x03, 0x07, 0x96]).is_empty());
        assert!(rx.is_empty());
    }

    #[test]
    fn test_stale_bytes_dropped() {
        let mut rx = receiver();
        let start = Instant::now();
        let frame = with_checksum(&[0x02, 0xf2, 0x01]);

        assert!(rx.feed_at(&frame[..2], start).is_empty());
        let late = start + Duration::from_millis(1500);
        assert!(rx.feed_at(&frame[2..], late).is_empty());
        // remaining bytes were parsed on their own and rejected
        assert!(rx.is_empty());

        assert!(rx.feed_at(&frame[..2], late).is_empty());
        let soon = late + Duration::from_millis(200);
        assert_eq!(
            rx.feed_at(&frame[2..], soon),
            vec![Message::WriteResetConfigAck { ok: true }]
        );
    }

    #[test]
    fn test_partial_config_kept_until_complete() {
        let mut rx = receiver();
        let mut stream = vec![0x01, 0x03, 0x03, 150];
        stream.extend(std::iter::repeat(0u8).take(146));
        assert!(rx.feed(&stream).is_empty());
        assert_eq!(rx.len(), 150);

        // four more payload bytes and a bad checksum
        assert!(rx.feed(&[0, 0, 0, 0, 0xaa]).is_empty());
        assert!(rx.is_empty());
    }
}
