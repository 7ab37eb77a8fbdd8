//! # Error Types
//!
//! Custom error types for Fixture Link using `thiserror`.
//!
//! The taxonomy follows the failure semantics of the wire protocol:
//!
//! - [`EncodeError`]: caller mistakes, raised synchronously before anything
//!   is transmitted.
//! - [`DecodeError`]: returned by the bulk offline decoder. The incremental
//!   parser never raises these; transport noise is absorbed into its
//!   statistics and the stream recovers on the next start marker.
//! - [`SequenceError`]: typed rejection of a relay sequence command, so an
//!   invalid sequence can never reach the executor.
//! - [`ExecuteError`]: failures while driving a validated sequence against
//!   the relay hardware.

use thiserror::Error;

/// Frame encoding errors
///
/// These are caller mistakes and fail fast before any bytes are written to
/// the link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// Frame type code is not exactly 3 plain ASCII characters
    #[error("invalid frame type {0:?}: must be exactly 3 ASCII characters")]
    InvalidType(String),

    /// Escaped payload does not fit the wire frame budget
    #[error("payload too large: {size} bytes of content exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Frame decoding errors
///
/// Returned by [`crate::frame::codec::decode`] when a complete frame buffer
/// fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is shorter than the minimum possible frame
    #[error("frame truncated: {0} bytes")]
    Truncated(usize),

    /// First byte is not the start marker
    #[error("missing start marker: got 0x{0:02X}")]
    MissingStartMarker(u8),

    /// Frame does not end with the checksum trailer where expected
    #[error("missing end marker")]
    MissingEndMarker,

    /// Length field is not 3 decimal digits followed by ':'
    #[error("invalid length field")]
    InvalidLengthField,

    /// Delimiter ':' not found where the format requires it
    #[error("missing ':' delimiter")]
    MissingDelimiter,

    /// Declared length does not match the actual content length
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Checksum field is not 4 hexadecimal digits
    #[error("invalid checksum field")]
    InvalidChecksumField,

    /// Recomputed checksum does not match the received one
    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{received:04X}")]
    ChecksumMismatch { expected: u16, received: u16 },

    /// Escape marker as the final payload byte with nothing following it
    #[error("truncated escape sequence at end of payload")]
    TruncatedEscape,

    /// Extra bytes after a complete frame
    #[error("{0} trailing bytes after frame")]
    TrailingData(usize),
}

/// Relay sequence command errors
///
/// Returned to the caller of the grammar parser and validator. Validation is
/// applied in a fixed order, so a sequence violating several rules at once
/// reports deterministically.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    /// Command text does not match the sequence grammar
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// More steps than the structural limit allows
    #[error("sequence too long: {steps} steps exceeds maximum {max}")]
    SequenceTooLong { steps: usize, max: usize },

    /// An active step is shorter than the minimum hold time
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    /// A relay repeats across consecutive active steps without a release
    #[error("relay overlap: relays {mask:#06X} active in consecutive steps {first} and {second}")]
    RelayOverlap {
        mask: u16,
        first: usize,
        second: usize,
    },

    /// An active step energizes more relays than the simultaneous limit
    #[error("too many relays: step {step} activates {count}, maximum is {max}")]
    TooManyRelays {
        step: usize,
        count: u32,
        max: u32,
    },

    /// Total sequence duration exceeds the hard time budget
    #[error("sequence timeout: total duration {total_ms} ms exceeds maximum {max_ms} ms")]
    SequenceTimeout { total_ms: u64, max_ms: u64 },
}

/// Sequence execution errors
///
/// Every failure path releases all relays before the executor returns, so a
/// failed or cancelled test never leaves hardware energized.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Execution was cancelled while steps remained
    #[error("sequence cancelled after {completed} of {total} steps")]
    Cancelled { completed: usize, total: usize },

    /// The relay bank or measurement hardware reported an error
    #[error("hardware error at step {step}: {source}")]
    Hardware {
        step: usize,
        #[source]
        source: std::io::Error,
    },

    /// Execution overran the sequence time budget
    #[error("sequence overran time budget: {elapsed_ms} ms elapsed")]
    Overrun { elapsed_ms: u64 },

    /// Formatted result does not fit the frame payload budget
    #[error("response too large: {size} bytes exceeds payload budget {max}")]
    ResponseTooLarge { size: usize, max: usize },
}

/// Main error type for Fixture Link
#[derive(Debug, Error)]
pub enum FixtureLinkError {
    /// Frame encoding errors
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Frame decoding errors
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Sequence parsing/validation errors
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Sequence execution errors
    #[error("execute error: {0}")]
    Execute(#[from] ExecuteError),

    /// Serial port errors
    #[error("serial error: {0}")]
    Serial(String),

    /// No serial port found at any candidate path
    #[error("no fixture serial port found (tried: {0})")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Fixture Link
pub type Result<T> = std::result::Result<T, FixtureLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_display() {
        let err = EncodeError::InvalidType("AB".to_string());
        assert!(err.to_string().contains("AB"));

        let err = EncodeError::PayloadTooLarge { size: 600, max: 502 };
        assert!(err.to_string().contains("600"));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_sequence_error_display() {
        let err = SequenceError::RelayOverlap {
            mask: 0x0001,
            first: 0,
            second: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("overlap"));
        assert!(msg.contains("0x0001"));
    }

    #[test]
    fn test_error_conversion() {
        let err: FixtureLinkError = EncodeError::InvalidType("X".to_string()).into();
        assert!(matches!(err, FixtureLinkError::Encode(_)));

        let err: FixtureLinkError = SequenceError::MalformedCommand("empty".to_string()).into();
        assert!(matches!(err, FixtureLinkError::Sequence(_)));
    }
}
