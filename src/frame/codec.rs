//! # Frame Codec
//!
//! Stateless encode/decode of complete frames.
//!
//! `encode` is the single way bytes leave this system; it is pure and may be
//! called concurrently from any task. `decode` is the strict inverse for
//! bulk offline decoding of captured buffers. Production reception of a live
//! stream goes through the incremental [`super::parser::FrameParser`]
//! instead.

use crate::error::{DecodeError, EncodeError};

use super::crc::crc16;
use super::escape::{escape, is_reserved, unescape};
use super::protocol::*;

/// Encode a typed payload into a complete wire frame
///
/// Builds `START LLL:TTT:escaped_payload END CCCC` where `LLL` is the
/// zero-padded decimal length of `TTT:escaped_payload` and `CCCC` is the
/// uppercase hex CRC-16 of `LLL:TTT:escaped_payload`.
///
/// # Arguments
///
/// * `frame_type` - 3-character ASCII type code (e.g. `"SEQ"`)
/// * `payload` - Raw payload bytes; reserved markers are escaped here
///
/// # Errors
///
/// * [`EncodeError::InvalidType`] - type code is not exactly 3 plain ASCII
///   characters
/// * [`EncodeError::PayloadTooLarge`] - escaped content exceeds
///   [`MAX_CONTENT_LEN`]
///
/// # Examples
///
/// ```
/// use fixture_link::frame::codec::encode;
///
/// let frame = encode("SEQ", b"1,2:500").unwrap();
/// assert_eq!(frame[0], 0x02); // start marker
/// ```
pub fn encode(frame_type: &str, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let type_bytes = frame_type.as_bytes();
    let type_ok = type_bytes.len() == TYPE_CODE_LEN
        && type_bytes
            .iter()
            .all(|&b| b.is_ascii_graphic() && !is_reserved(b));
    if !type_ok {
        return Err(EncodeError::InvalidType(frame_type.to_string()));
    }

    let escaped = escape(payload);
    let content_len = TYPE_CODE_LEN + 1 + escaped.len();
    if content_len > MAX_CONTENT_LEN {
        return Err(EncodeError::PayloadTooLarge {
            size: content_len,
            max: MAX_CONTENT_LEN,
        });
    }

    // Body between the markers, which is also the checksum input:
    // LLL:TTT:escaped_payload
    let mut body = Vec::with_capacity(LENGTH_FIELD_DIGITS + 1 + content_len);
    body.extend_from_slice(format!("{:03}", content_len).as_bytes());
    body.push(FIELD_SEPARATOR);
    body.extend_from_slice(type_bytes);
    body.push(FIELD_SEPARATOR);
    body.extend_from_slice(&escaped);

    let checksum = crc16(&body);

    let mut frame = Vec::with_capacity(body.len() + FRAME_OVERHEAD - LENGTH_FIELD_DIGITS - 1);
    frame.push(START_MARKER);
    frame.extend_from_slice(&body);
    frame.push(END_MARKER);
    frame.extend_from_slice(format!("{:04X}", checksum).as_bytes());

    Ok(frame)
}

/// Decode one complete frame buffer
///
/// Strict inverse of [`encode`] for offline use: the buffer must contain
/// exactly one frame with nothing before or after it.
///
/// # Errors
///
/// Returns the first [`DecodeError`] encountered while validating the
/// buffer against the wire format.
pub fn decode(buffer: &[u8]) -> Result<Frame, DecodeError> {
    // Smallest legal frame carries an empty payload: overhead + "TTT:"
    let min_len = FRAME_OVERHEAD + TYPE_CODE_LEN + 1;
    if buffer.len() < min_len {
        return Err(DecodeError::Truncated(buffer.len()));
    }

    if buffer[0] != START_MARKER {
        return Err(DecodeError::MissingStartMarker(buffer[0]));
    }

    let length_field = &buffer[1..1 + LENGTH_FIELD_DIGITS];
    if !length_field.iter().all(u8::is_ascii_digit) {
        return Err(DecodeError::InvalidLengthField);
    }
    let declared: usize = length_field
        .iter()
        .fold(0, |acc, &d| acc * 10 + (d - b'0') as usize);

    if buffer[1 + LENGTH_FIELD_DIGITS] != FIELD_SEPARATOR {
        return Err(DecodeError::MissingDelimiter);
    }

    // Scan for the unescaped end marker; an end marker inside an escape
    // sequence belongs to the payload.
    let content_start = 1 + LENGTH_FIELD_DIGITS + 1;
    let mut escaped_flag = false;
    let mut content_end = None;
    for (offset, &byte) in buffer[content_start..].iter().enumerate() {
        if escaped_flag {
            escaped_flag = false;
        } else if byte == ESCAPE_MARKER {
            escaped_flag = true;
        } else if byte == END_MARKER {
            content_end = Some(content_start + offset);
            break;
        }
    }
    let content_end = content_end.ok_or(DecodeError::MissingEndMarker)?;
    let content = &buffer[content_start..content_end];

    if content.len() != declared {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: content.len(),
        });
    }
    if content.len() < TYPE_CODE_LEN + 1 || content[TYPE_CODE_LEN] != FIELD_SEPARATOR {
        return Err(DecodeError::MissingDelimiter);
    }

    let trailer = &buffer[content_end + 1..];
    if trailer.len() < CHECKSUM_HEX_DIGITS {
        return Err(DecodeError::Truncated(buffer.len()));
    }
    if trailer.len() > CHECKSUM_HEX_DIGITS {
        return Err(DecodeError::TrailingData(trailer.len() - CHECKSUM_HEX_DIGITS));
    }

    let checksum_text =
        std::str::from_utf8(trailer).map_err(|_| DecodeError::InvalidChecksumField)?;
    let received =
        u16::from_str_radix(checksum_text, 16).map_err(|_| DecodeError::InvalidChecksumField)?;

    let expected = crc16(&buffer[1..content_end]);
    if expected != received {
        return Err(DecodeError::ChecksumMismatch { expected, received });
    }

    let payload = unescape(&content[TYPE_CODE_LEN + 1..])?;
    let frame_type = String::from_utf8_lossy(&content[..TYPE_CODE_LEN]).into_owned();

    Ok(Frame::new(frame_type, payload, received))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_structure() {
        let frame = encode("SEQ", b"1,2:500").unwrap();

        // START + "011" + ":" + "SEQ" + ":" + payload(7) + END + 4 hex
        assert_eq!(frame[0], START_MARKER);
        assert_eq!(&frame[1..4], b"011");
        assert_eq!(frame[4], FIELD_SEPARATOR);
        assert_eq!(&frame[5..8], b"SEQ");
        assert_eq!(frame[8], FIELD_SEPARATOR);
        assert_eq!(frame[16], END_MARKER);
        assert_eq!(frame.len(), 7 + FRAME_OVERHEAD + TYPE_CODE_LEN + 1);
        assert!(frame[17..].iter().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_encode_rejects_short_type() {
        assert_eq!(
            encode("AB", b"payload"),
            Err(EncodeError::InvalidType("AB".to_string()))
        );
    }

    #[test]
    fn test_encode_rejects_long_type() {
        assert!(matches!(
            encode("ABCD", b""),
            Err(EncodeError::InvalidType(_))
        ));
    }

    #[test]
    fn test_encode_rejects_non_ascii_type() {
        assert!(matches!(encode("SÉQ", b""), Err(EncodeError::InvalidType(_))));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        // 500 plain bytes gives content length 504 > 502
        let payload = vec![b'0'; MAX_CONTENT_LEN - TYPE_CODE_LEN + 1];
        assert!(matches!(
            encode("SEQ", &payload),
            Err(EncodeError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_max_payload_fits() {
        let payload = vec![b'0'; MAX_CONTENT_LEN - TYPE_CODE_LEN - 1];
        let frame = encode("SEQ", &payload).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_encode_worst_case_escaping_fits() {
        // Every byte reserved, so each one doubles on the wire
        let payload = vec![START_MARKER; MAX_PAYLOAD_LEN];
        let frame = encode("SEQ", &payload).unwrap();
        assert!(frame.len() <= MAX_FRAME_SIZE);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            b"1,2,3:500;OFF:100;4,5,6:500".to_vec(),
            vec![START_MARKER, END_MARKER, ESCAPE_MARKER, 0x00, 0xFF],
        ];

        for payload in payloads {
            let frame = encode("SEQ", &payload).unwrap();
            let decoded = decode(&frame).unwrap();
            assert_eq!(decoded.frame_type, "SEQ");
            assert_eq!(decoded.payload, payload);
        }
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(
            decode(&[START_MARKER, b'0']),
            Err(DecodeError::Truncated(_))
        ));
    }

    #[test]
    fn test_decode_bad_start_marker() {
        let mut frame = encode("SEQ", b"1:100").unwrap();
        frame[0] = 0x55;
        assert_eq!(decode(&frame), Err(DecodeError::MissingStartMarker(0x55)));
    }

    #[test]
    fn test_decode_corrupted_content_fails_checksum() {
        let mut frame = encode("SEQ", b"1,2:500").unwrap();
        frame[10] ^= 0x01; // payload byte, stays non-reserved
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_corrupted_length_field() {
        let mut frame = encode("SEQ", b"1,2:500").unwrap();
        frame[1] = b'X';
        assert_eq!(decode(&frame), Err(DecodeError::InvalidLengthField));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut frame = encode("SEQ", b"1,2:500").unwrap();
        frame[3] = b'9'; // declare a longer content than present
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::LengthMismatch { .. }) | Err(DecodeError::MissingEndMarker)
        ));
    }

    #[test]
    fn test_decode_trailing_data() {
        let mut frame = encode("SEQ", b"1,2:500").unwrap();
        frame.extend_from_slice(b"junk");
        assert_eq!(decode(&frame), Err(DecodeError::TrailingData(4)));
    }

    #[test]
    fn test_decode_escaped_end_marker_in_payload() {
        // An end marker inside the payload must not terminate the content
        let frame = encode("RSP", &[0x41, END_MARKER, 0x42]).unwrap();
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.payload, vec![0x41, END_MARKER, 0x42]);
    }
}
