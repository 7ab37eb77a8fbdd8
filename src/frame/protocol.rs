//! # Wire Protocol Constants and Types
//!
//! Core definitions for the fixture serial frame format.
//!
//! Frame layout (all fields ASCII except escaped payload bytes):
//!
//! ```text
//! START LLL : TTT : PAYLOAD END CCCC
//! ```
//!
//! - `LLL`: 3 decimal digits, zero-padded, length of `TTT:PAYLOAD_escaped`
//! - `TTT`: exactly 3 characters identifying the message kind
//! - `CCCC`: 4 uppercase hex digits, CRC-16 of `LLL:TTT:PAYLOAD_escaped`

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Frame start marker (STX)
pub const START_MARKER: u8 = 0x02;

/// Frame end marker (ETX)
pub const END_MARKER: u8 = 0x03;

/// Escape marker preceding a stuffed payload byte
pub const ESCAPE_MARKER: u8 = 0x1B;

/// XOR mask applied to a reserved byte when it is escaped
pub const ESCAPE_XOR: u8 = 0x20;

/// Field separator between length, type and payload
pub const FIELD_SEPARATOR: u8 = b':';

/// Number of digits in the zero-padded length field
pub const LENGTH_FIELD_DIGITS: usize = 3;

/// Number of characters in the frame type code
pub const TYPE_CODE_LEN: usize = 3;

/// Number of hex digits in the checksum trailer
pub const CHECKSUM_HEX_DIGITS: usize = 4;

/// Maximum total frame size on the wire
pub const MAX_FRAME_SIZE: usize = 512;

/// Fixed per-frame overhead: start(1) + length(3) + ':'(1) + end(1) + checksum(4)
pub const FRAME_OVERHEAD: usize = 1 + LENGTH_FIELD_DIGITS + 1 + 1 + CHECKSUM_HEX_DIGITS;

/// Maximum length of `TTT:PAYLOAD_escaped`
///
/// This is the budget the length field describes; everything else in the
/// frame is fixed overhead.
pub const MAX_CONTENT_LEN: usize = MAX_FRAME_SIZE - FRAME_OVERHEAD;

/// Maximum unescaped payload bytes that are guaranteed to fit
///
/// Worst case every payload byte escapes to two bytes on the wire.
pub const MAX_PAYLOAD_LEN: usize = (MAX_CONTENT_LEN - TYPE_CODE_LEN - 1) / 2;

/// Relay sequence command frame type
pub const FRAME_TYPE_SEQUENCE: &str = "SEQ";

/// Sequence result response frame type
pub const FRAME_TYPE_RESPONSE: &str = "RSP";

/// Error report frame type
pub const FRAME_TYPE_ERROR: &str = "ERR";

/// Link statistics request/response frame type
pub const FRAME_TYPE_STATS: &str = "STS";

/// A complete, validated frame received from the link
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 3-character frame type code
    pub frame_type: String,

    /// Unescaped payload bytes
    pub payload: Vec<u8>,

    /// Checksum as received on the wire (already verified)
    pub checksum: u16,

    /// Wall-clock time the frame completed
    pub received_at: DateTime<Utc>,
}

impl Frame {
    /// Create a frame stamped with the current time
    pub fn new(frame_type: impl Into<String>, payload: Vec<u8>, checksum: u16) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload,
            checksum,
            received_at: Utc::now(),
        }
    }

    /// Payload interpreted as UTF-8 text, lossily
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Running frame reception statistics
///
/// Persists for the life of a parser instance and is never reset
/// automatically. Transport-level noise is invisible to callers except
/// through these counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// Frame attempts started (a start marker was seen)
    pub attempted: u64,

    /// Frames that passed all validation and were emitted
    pub valid: u64,

    /// Attempts dropped because the checksum did not match
    pub checksum_mismatch: u64,

    /// Attempts dropped because a field violated the format
    pub malformed: u64,

    /// Attempts abandoned because the frame timeout elapsed
    pub timed_out: u64,
}

impl FrameStats {
    /// Total failed attempts
    pub fn errors(&self) -> u64 {
        self.checksum_mismatch + self.malformed + self.timed_out
    }

    /// Fraction of attempts that failed, 0.0 when nothing was attempted
    pub fn error_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.errors() as f64 / self.attempted as f64
        }
    }
}
