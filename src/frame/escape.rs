//! # Escape Codec
//!
//! Reversible byte-stuffing for the three reserved frame markers.
//!
//! Start, end and escape markers must never appear literally inside a
//! payload, or the parser would mistake payload bytes for frame structure.
//! A reserved byte `b` is transmitted as `ESC, b ^ 0x20`.

use crate::error::DecodeError;

use super::protocol::{END_MARKER, ESCAPE_MARKER, ESCAPE_XOR, START_MARKER};

/// Check whether a byte is one of the reserved frame markers
pub fn is_reserved(byte: u8) -> bool {
    byte == START_MARKER || byte == END_MARKER || byte == ESCAPE_MARKER
}

/// Escape reserved bytes in a payload
///
/// Every reserved byte is replaced with the escape marker followed by the
/// byte XORed with [`ESCAPE_XOR`]; all other bytes pass through unchanged.
///
/// # Examples
///
/// ```
/// use fixture_link::frame::escape::escape;
///
/// assert_eq!(escape(&[0x41, 0x02, 0x42]), vec![0x41, 0x1B, 0x22, 0x42]);
/// ```
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(payload.len());

    for &byte in payload {
        if is_reserved(byte) {
            escaped.push(ESCAPE_MARKER);
            escaped.push(byte ^ ESCAPE_XOR);
        } else {
            escaped.push(byte);
        }
    }

    escaped
}

/// Reverse byte-stuffing applied by [`escape`]
///
/// On encountering the escape marker, the following byte is consumed and
/// XORed back to its original value.
///
/// # Errors
///
/// Returns [`DecodeError::TruncatedEscape`] when the escape marker is the
/// final byte, since the byte it announces is missing. This is reported to
/// the caller rather than silently dropped.
pub fn unescape(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut unescaped = Vec::with_capacity(data.len());
    let mut iter = data.iter();

    while let Some(&byte) = iter.next() {
        if byte == ESCAPE_MARKER {
            match iter.next() {
                Some(&stuffed) => unescaped.push(stuffed ^ ESCAPE_XOR),
                None => return Err(DecodeError::TruncatedEscape),
            }
        } else {
            unescaped.push(byte);
        }
    }

    Ok(unescaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_passthrough() {
        let payload = b"1,2,3:500;OFF:100";
        assert_eq!(escape(payload), payload.to_vec());
    }

    #[test]
    fn test_escape_reserved_bytes() {
        let payload = [START_MARKER, END_MARKER, ESCAPE_MARKER];
        let escaped = escape(&payload);

        assert_eq!(
            escaped,
            vec![
                ESCAPE_MARKER,
                START_MARKER ^ ESCAPE_XOR,
                ESCAPE_MARKER,
                END_MARKER ^ ESCAPE_XOR,
                ESCAPE_MARKER,
                ESCAPE_MARKER ^ ESCAPE_XOR,
            ]
        );
    }

    #[test]
    fn test_escape_output_has_no_unescaped_reserved_bytes() {
        // Every byte value must survive escaping without leaving a bare
        // marker in the output (escape markers announce a stuffed byte).
        let payload: Vec<u8> = (0..=255).collect();
        let escaped = escape(&payload);

        let mut i = 0;
        while i < escaped.len() {
            if escaped[i] == ESCAPE_MARKER {
                i += 2; // stuffed byte follows
                continue;
            }
            assert!(!is_reserved(escaped[i]), "bare marker at index {}", i);
            i += 1;
        }
    }

    #[test]
    fn test_unescape_inverts_escape() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            b"plain text".to_vec(),
            vec![START_MARKER, END_MARKER, ESCAPE_MARKER],
            (0..=255).collect(),
            vec![ESCAPE_MARKER; 10],
        ];

        for payload in cases {
            assert_eq!(unescape(&escape(&payload)).unwrap(), payload);
        }
    }

    #[test]
    fn test_unescape_trailing_escape_is_malformed() {
        let result = unescape(&[0x41, ESCAPE_MARKER]);
        assert_eq!(result, Err(DecodeError::TruncatedEscape));
    }

    #[test]
    fn test_unescape_lone_escape_is_malformed() {
        assert_eq!(unescape(&[ESCAPE_MARKER]), Err(DecodeError::TruncatedEscape));
    }
}
