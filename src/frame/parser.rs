//! # Incremental Frame Parser
//!
//! Stateful state machine that reassembles frames from a byte stream of
//! arbitrary chunking.
//!
//! This module handles:
//! - Frame synchronization on the start marker, discarding line noise
//! - Field-by-field validation (length, type, payload, checksum)
//! - Per-frame timeout recovery measured against a monotonic clock
//! - Running error statistics for link diagnostics
//!
//! The parser never raises for malformed input: every failure increments the
//! relevant [`FrameStats`] counter and silently resets to idle, because
//! transient noise on a serial link must not be fatal to an otherwise
//! healthy connection. Callers observe only the stream of valid frames plus
//! the aggregate statistics.
//!
//! Feeding is chunk-invariant: for any split of the same underlying bytes,
//! the emitted frames are identical. Bytes are processed one at a time
//! internally, so chunk boundaries carry no meaning.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use super::crc::crc16;
use super::escape::unescape;
use super::protocol::*;

/// Default per-frame completion timeout
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Parser state, carrying only the data relevant to the current phase
///
/// Illegal combinations (e.g. a declared length while idle) are
/// unrepresentable. Every non-idle variant records when the attempt started
/// so the timeout can be checked against a monotonic clock.
#[derive(Debug)]
enum ParserState {
    /// Discarding bytes until a start marker is seen
    Idle,

    /// Accumulating the 3 decimal digits of the length field
    ReadingLength { started: Instant, digits: Vec<u8> },

    /// Accumulating the 3-character type code
    ReadingType {
        started: Instant,
        length_field: [u8; 3],
        declared_len: usize,
        code: Vec<u8>,
    },

    /// Accumulating still-escaped payload bytes until an unescaped end marker
    ReadingPayload {
        started: Instant,
        length_field: [u8; 3],
        declared_len: usize,
        frame_type: [u8; 3],
        raw: BytesMut,
        /// Previous byte was the escape marker, so the next byte is payload
        /// even if it looks like a frame terminator
        escaped: bool,
    },

    /// Accumulating the 4 hex digits of the checksum trailer
    ReadingChecksum {
        started: Instant,
        length_field: [u8; 3],
        frame_type: [u8; 3],
        raw: BytesMut,
        payload: Vec<u8>,
        hex: Vec<u8>,
    },
}

impl ParserState {
    /// Start time of the current attempt, if one is in progress
    fn started(&self) -> Option<Instant> {
        match self {
            ParserState::Idle => None,
            ParserState::ReadingLength { started, .. }
            | ParserState::ReadingType { started, .. }
            | ParserState::ReadingPayload { started, .. }
            | ParserState::ReadingChecksum { started, .. } => Some(*started),
        }
    }
}

/// Incremental frame parser
///
/// Single-threaded-cooperative: one logical reader feeds bytes in order.
/// The parser holds no locks and must not be fed concurrently.
///
/// # Examples
///
/// ```
/// use fixture_link::frame::FrameParser;
/// use fixture_link::frame::codec::encode;
///
/// let mut parser = FrameParser::default();
/// let wire = encode("SEQ", b"1,2:500").unwrap();
///
/// let frames = parser.feed(&wire);
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].payload, b"1,2:500");
/// ```
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    timeout: Duration,
    stats: FrameStats,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_TIMEOUT)
    }
}

impl FrameParser {
    /// Create a parser with the given per-frame timeout
    ///
    /// The timer starts at the start marker of each attempt; if the frame
    /// has not completed when the timeout elapses, the attempt is abandoned
    /// and the parser resynchronizes on the next start marker.
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ParserState::Idle,
            timeout,
            stats: FrameStats::default(),
        }
    }

    /// Running reception statistics
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Feed a chunk of bytes, returning any frames completed by it
    ///
    /// Equivalent for any chunking of the same underlying byte stream.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            self.check_timeout();
            if let Some(frame) = self.feed_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Abandon the current attempt if its timeout has elapsed
    ///
    /// Also callable between chunks so a stuck attempt is not held past its
    /// deadline while the line is silent.
    pub fn check_timeout(&mut self) {
        if let Some(started) = self.state.started() {
            if started.elapsed() >= self.timeout {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "frame attempt timed out, resynchronizing"
                );
                self.stats.timed_out += 1;
                self.state = ParserState::Idle;
            }
        }
    }

    fn fail_malformed(&mut self, reason: &str) {
        debug!(reason, "malformed frame dropped");
        self.stats.malformed += 1;
        self.state = ParserState::Idle;
    }

    fn begin_attempt(&mut self) {
        self.stats.attempted += 1;
        self.state = ParserState::ReadingLength {
            started: Instant::now(),
            digits: Vec::with_capacity(LENGTH_FIELD_DIGITS),
        };
    }

    /// Advance the state machine by one byte
    fn feed_byte(&mut self, byte: u8) -> Option<Frame> {
        match std::mem::replace(&mut self.state, ParserState::Idle) {
            ParserState::Idle => {
                if byte == START_MARKER {
                    self.begin_attempt();
                } else {
                    trace!(byte, "discarding byte outside frame");
                }
                None
            }

            ParserState::ReadingLength { started, mut digits } => {
                if digits.len() < LENGTH_FIELD_DIGITS {
                    if byte.is_ascii_digit() {
                        digits.push(byte);
                        self.state = ParserState::ReadingLength { started, digits };
                    } else {
                        self.fail_malformed("non-digit in length field");
                    }
                    return None;
                }

                // Byte following the third digit must be the separator
                if byte != FIELD_SEPARATOR {
                    self.fail_malformed("missing separator after length field");
                    return None;
                }

                let declared_len = digits
                    .iter()
                    .fold(0usize, |acc, &d| acc * 10 + (d - b'0') as usize);
                let length_field = [digits[0], digits[1], digits[2]];
                self.state = ParserState::ReadingType {
                    started,
                    length_field,
                    declared_len,
                    code: Vec::with_capacity(TYPE_CODE_LEN),
                };
                None
            }

            ParserState::ReadingType {
                started,
                length_field,
                declared_len,
                mut code,
            } => {
                if code.len() < TYPE_CODE_LEN {
                    code.push(byte);
                    self.state = ParserState::ReadingType {
                        started,
                        length_field,
                        declared_len,
                        code,
                    };
                    return None;
                }

                if byte != FIELD_SEPARATOR {
                    self.fail_malformed("missing separator after type code");
                    return None;
                }

                self.state = ParserState::ReadingPayload {
                    started,
                    length_field,
                    declared_len,
                    frame_type: [code[0], code[1], code[2]],
                    raw: BytesMut::new(),
                    escaped: false,
                };
                None
            }

            ParserState::ReadingPayload {
                started,
                length_field,
                declared_len,
                frame_type,
                mut raw,
                escaped,
            } => {
                if !escaped && byte == END_MARKER {
                    // Declared length covers the type code, separator and
                    // the escaped payload exactly as transmitted.
                    if declared_len != TYPE_CODE_LEN + 1 + raw.len() {
                        self.fail_malformed("declared length does not match content");
                        return None;
                    }

                    let payload = match unescape(&raw) {
                        Ok(payload) => payload,
                        Err(_) => {
                            self.fail_malformed("invalid escape sequence in payload");
                            return None;
                        }
                    };

                    self.state = ParserState::ReadingChecksum {
                        started,
                        length_field,
                        frame_type,
                        raw,
                        payload,
                        hex: Vec::with_capacity(CHECKSUM_HEX_DIGITS),
                    };
                    return None;
                }

                raw.extend_from_slice(&[byte]);
                // Bound accumulation so a stuck stream cannot grow memory
                // without limit.
                if TYPE_CODE_LEN + 1 + raw.len() > MAX_CONTENT_LEN {
                    self.fail_malformed("payload exceeds frame budget");
                    return None;
                }

                let next_escaped = !escaped && byte == ESCAPE_MARKER;
                self.state = ParserState::ReadingPayload {
                    started,
                    length_field,
                    declared_len,
                    frame_type,
                    raw,
                    escaped: next_escaped,
                };
                None
            }

            ParserState::ReadingChecksum {
                started,
                length_field,
                frame_type,
                raw,
                payload,
                mut hex,
            } => {
                if !byte.is_ascii_hexdigit() {
                    self.fail_malformed("non-hex byte in checksum field");
                    return None;
                }
                hex.push(byte);

                if hex.len() < CHECKSUM_HEX_DIGITS {
                    self.state = ParserState::ReadingChecksum {
                        started,
                        length_field,
                        frame_type,
                        raw,
                        payload,
                        hex,
                    };
                    return None;
                }

                let received = match std::str::from_utf8(&hex)
                    .ok()
                    .and_then(|text| u16::from_str_radix(text, 16).ok())
                {
                    Some(received) => received,
                    None => {
                        self.fail_malformed("invalid checksum field");
                        return None;
                    }
                };

                let mut crc_input =
                    Vec::with_capacity(LENGTH_FIELD_DIGITS + 1 + TYPE_CODE_LEN + 1 + raw.len());
                crc_input.extend_from_slice(&length_field);
                crc_input.push(FIELD_SEPARATOR);
                crc_input.extend_from_slice(&frame_type);
                crc_input.push(FIELD_SEPARATOR);
                crc_input.extend_from_slice(&raw);
                let expected = crc16(&crc_input);

                self.state = ParserState::Idle;

                if expected != received {
                    debug!(
                        expected = %format!("{:04X}", expected),
                        received = %format!("{:04X}", received),
                        "checksum mismatch, frame dropped"
                    );
                    self.stats.checksum_mismatch += 1;
                    return None;
                }

                self.stats.valid += 1;
                let frame_type = String::from_utf8_lossy(&frame_type).into_owned();
                trace!(
                    frame_type = %frame_type,
                    payload_len = payload.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "frame completed"
                );
                Some(Frame::new(frame_type, payload, received))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::codec::encode;

    #[test]
    fn test_parse_single_chunk() {
        let mut parser = FrameParser::default();
        let wire = encode("SEQ", b"1,2,3:500;OFF:100").unwrap();

        let frames = parser.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, "SEQ");
        assert_eq!(frames[0].payload, b"1,2,3:500;OFF:100");
        assert_eq!(parser.stats().attempted, 1);
        assert_eq!(parser.stats().valid, 1);
    }

    #[test]
    fn test_parse_byte_by_byte_matches_single_chunk() {
        let wire = encode("SEQ", b"1,2,3:500").unwrap();

        let mut whole = FrameParser::default();
        let expected = whole.feed(&wire);

        let mut trickle = FrameParser::default();
        let mut got = Vec::new();
        for &byte in &wire {
            got.extend(trickle.feed(&[byte]));
        }

        assert_eq!(expected.len(), 1);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame_type, expected[0].frame_type);
        assert_eq!(got[0].payload, expected[0].payload);
        assert_eq!(got[0].checksum, expected[0].checksum);
    }

    #[test]
    fn test_parse_arbitrary_chunking() {
        let wire = encode("RSP", b"1,2:12.00,0.45;END").unwrap();

        for split in 1..wire.len() {
            let mut parser = FrameParser::default();
            let mut frames = parser.feed(&wire[..split]);
            frames.extend(parser.feed(&wire[split..]));
            assert_eq!(frames.len(), 1, "split at {} lost the frame", split);
            assert_eq!(frames[0].payload, b"1,2:12.00,0.45;END");
        }
    }

    #[test]
    fn test_parse_multiple_frames_in_one_chunk() {
        let mut wire = encode("SEQ", b"1:100").unwrap();
        wire.extend(encode("STS", b"").unwrap());

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_type, "SEQ");
        assert_eq!(frames[1].frame_type, "STS");
    }

    #[test]
    fn test_noise_before_frame_is_discarded() {
        let mut wire = b"garbage \xFF\x00 noise".to_vec();
        wire.extend(encode("SEQ", b"1:100").unwrap());

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert_eq!(frames.len(), 1);
        // Noise outside an attempt is not an attempt
        assert_eq!(parser.stats().attempted, 1);
        assert_eq!(parser.stats().errors(), 0);
    }

    #[test]
    fn test_corrupted_content_counts_checksum_mismatch() {
        let mut wire = encode("SEQ", b"1,2:500").unwrap();
        wire[5] ^= 0x01; // type code byte, stays printable

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().checksum_mismatch, 1);
        assert_eq!(parser.stats().valid, 0);
    }

    #[test]
    fn test_corrupted_checksum_field_counts_mismatch() {
        let mut wire = encode("SEQ", b"1,2:500").unwrap();
        let last = wire.len() - 1;
        // Replace the final hex digit with a different hex digit
        wire[last] = if wire[last] == b'0' { b'1' } else { b'0' };

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().checksum_mismatch, 1);
    }

    #[test]
    fn test_recovers_after_corrupt_frame() {
        let mut wire = encode("SEQ", b"1:100").unwrap();
        wire[6] ^= 0x01;
        wire.extend(encode("SEQ", b"2:200").unwrap());

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"2:200");
        assert_eq!(parser.stats().attempted, 2);
        assert_eq!(parser.stats().checksum_mismatch, 1);
        assert_eq!(parser.stats().valid, 1);
    }

    #[test]
    fn test_non_digit_length_is_malformed() {
        let mut parser = FrameParser::default();
        let frames = parser.feed(&[START_MARKER, b'0', b'X']);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().malformed, 1);
        assert_eq!(parser.stats().attempted, 1);
    }

    #[test]
    fn test_missing_separator_after_length_is_malformed() {
        let mut parser = FrameParser::default();
        parser.feed(&[START_MARKER, b'0', b'1', b'2', b'X']);
        assert_eq!(parser.stats().malformed, 1);
    }

    #[test]
    fn test_declared_length_mismatch_is_malformed() {
        // Declares 9 bytes of content but carries "SEQ:" + "1:100" = 9... use 8
        let mut wire = encode("SEQ", b"1:100").unwrap();
        wire[3] = b'8'; // was "009"

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().malformed, 1);
    }

    #[test]
    fn test_escaped_end_marker_does_not_terminate_payload() {
        let payload = [0x41, END_MARKER, START_MARKER, ESCAPE_MARKER, 0x42];
        let wire = encode("SEQ", &payload).unwrap();

        let mut parser = FrameParser::default();
        let frames = parser.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn test_oversized_payload_is_malformed() {
        // Hand-build an attempt that never terminates; the parser must cap
        // accumulation at the content budget instead of growing forever.
        let mut parser = FrameParser::default();
        parser.feed(&[START_MARKER, b'9', b'9', b'9', b':', b'S', b'E', b'Q', b':']);
        let frames = parser.feed(&vec![b'A'; MAX_CONTENT_LEN + 10]);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().malformed, 1);
    }

    #[test]
    fn test_frame_timeout_drops_attempt() {
        let mut parser = FrameParser::new(Duration::from_millis(30));

        // Start a frame, then stall past the timeout
        let wire = encode("SEQ", b"1:100").unwrap();
        let frames = parser.feed(&wire[..6]);
        assert!(frames.is_empty());

        std::thread::sleep(Duration::from_millis(60));

        // Remainder arrives too late; nothing valid may come out of it
        let frames = parser.feed(&wire[6..]);
        assert!(frames.is_empty());
        assert_eq!(parser.stats().timed_out, 1);
        assert_eq!(parser.stats().valid, 0);
    }

    #[test]
    fn test_frame_completes_within_timeout() {
        let mut parser = FrameParser::new(Duration::from_secs(5));
        let wire = encode("SEQ", b"1:100").unwrap();

        let mut frames = parser.feed(&wire[..6]);
        frames.extend(parser.feed(&wire[6..]));
        assert_eq!(frames.len(), 1);
        assert_eq!(parser.stats().timed_out, 0);
    }

    #[test]
    fn test_stats_persist_across_frames() {
        let mut parser = FrameParser::default();
        for i in 0..5u8 {
            let payload = format!("{}:100", i + 1);
            let mut wire = encode("SEQ", payload.as_bytes()).unwrap();
            if i % 2 == 1 {
                wire[9] ^= 0x01;
            }
            parser.feed(&wire);
        }

        assert_eq!(parser.stats().attempted, 5);
        assert_eq!(parser.stats().valid, 3);
        assert_eq!(parser.stats().checksum_mismatch, 2);
        assert!((parser.stats().error_rate() - 0.4).abs() < f64::EPSILON);
    }
}
