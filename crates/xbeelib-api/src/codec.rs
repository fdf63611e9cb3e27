//! XBee API frame envelope encoder/decoder.
//!
//! # Frame format
//!
//! ```text
//! 0x7E <len MSB> <len LSB> <frame data ...> <checksum>
//! ```
//!
//! - Start delimiter: `0x7E`
//! - Length: number of frame data bytes, big-endian
//! - Frame data: frame type byte followed by the body
//! - Checksum: `0xFF` minus the low byte of the sum of the frame data
//!
//! In API mode 2 every byte after the start delimiter that equals `0x7E`,
//! `0x7D`, `0x11` or `0x13` is sent as `0x7D` followed by the byte XOR
//! `0x20`. A raw `0x7E` therefore always marks a frame start, which lets
//! the decoder resynchronise after line noise.

use bytes::{BufMut, BytesMut};

use crate::frame::ApiFrame;

/// Start delimiter.
pub const START_DELIMITER: u8 = 0x7E;

/// Escape byte (API mode 2).
pub const ESCAPE: u8 = 0x7D;

/// Software flow control on.
pub const XON: u8 = 0x11;

/// Software flow control off.
pub const XOFF: u8 = 0x13;

/// Value XORed into an escaped byte.
pub const ESCAPE_XOR: u8 = 0x20;

/// Largest frame data length accepted by the decoder.
///
/// XBee modules never emit frames anywhere near this size; a larger
/// length field means the decoder locked onto noise.
pub const MAX_FRAME_DATA: usize = 512;

/// XBee API operating mode (`AP` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiMode {
    /// `AP=1`: no escaping.
    #[default]
    Unescaped,
    /// `AP=2`: control bytes escaped.
    Escaped,
}

impl ApiMode {
    /// The numeric `AP` value.
    pub fn as_u8(self) -> u8 {
        match self {
            ApiMode::Unescaped => 1,
            ApiMode::Escaped => 2,
        }
    }
}

impl TryFrom<u8> for ApiMode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            1 => Ok(ApiMode::Unescaped),
            2 => Ok(ApiMode::Escaped),
            other => Err(other),
        }
    }
}

/// Compute the checksum of a frame data block.
///
/// # Example
///
/// ```
/// use xbeelib_api::codec::checksum;
///
/// // AT NJ with frame ID 0x52
/// assert_eq!(checksum(&[0x08, 0x52, b'N', b'J']), 0x0D);
/// ```
pub fn checksum(frame_data: &[u8]) -> u8 {
    let sum = frame_data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    0xFF - sum
}

fn needs_escape(b: u8) -> bool {
    matches!(b, START_DELIMITER | ESCAPE | XON | XOFF)
}

fn put_escaped(buf: &mut BytesMut, b: u8, mode: ApiMode) {
    if mode == ApiMode::Escaped && needs_escape(b) {
        buf.put_u8(ESCAPE);
        buf.put_u8(b ^ ESCAPE_XOR);
    } else {
        buf.put_u8(b);
    }
}

/// Wrap frame data in the API envelope.
pub fn encode_frame_data(frame_data: &[u8], mode: ApiMode) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(frame_data.len() + 8);
    buf.put_u8(START_DELIMITER);
    let len = (frame_data.len() as u16).to_be_bytes();
    for b in len.iter().chain(frame_data).copied() {
        put_escaped(&mut buf, b, mode);
    }
    put_escaped(&mut buf, checksum(frame_data), mode);
    buf.to_vec()
}

/// Encode an [`ApiFrame`] into raw bytes ready for transmission.
///
/// # Example
///
/// ```
/// use xbeelib_api::codec::{encode_frame, ApiMode};
/// use xbeelib_api::frame::{ApiFrame, AtCommand};
///
/// let frame = ApiFrame::AtCommand {
///     frame_id: 0x52,
///     command: AtCommand::new("NJ").unwrap(),
///     parameter: vec![],
/// };
/// let bytes = encode_frame(&frame, ApiMode::Unescaped);
/// assert_eq!(bytes, vec![0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0D]);
/// ```
pub fn encode_frame(frame: &ApiFrame, mode: ApiMode) -> Vec<u8> {
    encode_frame_data(&frame.to_bytes(), mode)
}

/// Result of attempting to decode a frame from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete frame was decoded. The `usize` is the number of bytes
    /// consumed from the input buffer (including any leading noise).
    Frame(ApiFrame, usize),

    /// The buffer does not yet contain a complete frame.
    Incomplete,

    /// Noise, a bad checksum, or a truncated frame. The `usize` is the
    /// number of bytes to discard before trying again.
    Invalid(usize),
}

enum Step {
    Byte(u8),
    /// Ran out of input.
    End,
    /// Hit a raw start delimiter at this offset (escaped mode only).
    Restart(usize),
}

/// Reads envelope bytes, undoing API mode 2 escaping.
struct Unescaper<'a> {
    buf: &'a [u8],
    pos: usize,
    mode: ApiMode,
}

impl Unescaper<'_> {
    fn step(&mut self) -> Step {
        let Some(&b) = self.buf.get(self.pos) else {
            return Step::End;
        };
        if self.mode == ApiMode::Unescaped {
            self.pos += 1;
            return Step::Byte(b);
        }
        match b {
            START_DELIMITER => Step::Restart(self.pos),
            ESCAPE => match self.buf.get(self.pos + 1) {
                None => Step::End,
                Some(&START_DELIMITER) => Step::Restart(self.pos + 1),
                Some(&escaped) => {
                    self.pos += 2;
                    Step::Byte(escaped ^ ESCAPE_XOR)
                }
            },
            _ => {
                self.pos += 1;
                Step::Byte(b)
            }
        }
    }
}

/// Attempt to decode one API frame from a byte buffer.
///
/// Bytes before the first start delimiter are noise. Returns
/// [`DecodeResult::Frame`] with the number of bytes consumed,
/// [`DecodeResult::Incomplete`] if more data is needed, or
/// [`DecodeResult::Invalid`] with the number of bytes to drop.
///
/// # Example
///
/// ```
/// use xbeelib_api::codec::{decode_frame, ApiMode, DecodeResult};
/// use xbeelib_api::frame::ApiFrame;
///
/// // TX status, frame ID 1, success
/// let buf = [0x7E, 0x00, 0x03, 0x89, 0x01, 0x00, 0x75];
/// match decode_frame(&buf, ApiMode::Unescaped) {
///     DecodeResult::Frame(ApiFrame::TxStatus { frame_id, status }, consumed) => {
///         assert_eq!((frame_id, status), (1, 0));
///         assert_eq!(consumed, 7);
///     }
///     other => panic!("expected a frame, got {:?}", other),
/// }
/// ```
pub fn decode_frame(buf: &[u8], mode: ApiMode) -> DecodeResult {
    let start = match buf.iter().position(|&b| b == START_DELIMITER) {
        Some(pos) => pos,
        None if buf.is_empty() => return DecodeResult::Incomplete,
        None => return DecodeResult::Invalid(buf.len()),
    };

    let mut reader = Unescaper {
        buf,
        pos: start + 1,
        mode,
    };

    macro_rules! next_byte {
        () => {
            match reader.step() {
                Step::Byte(b) => b,
                Step::End => return DecodeResult::Incomplete,
                Step::Restart(at) => return DecodeResult::Invalid(at),
            }
        };
    }

    let len = u16::from_be_bytes([next_byte!(), next_byte!()]) as usize;
    if len == 0 || len > MAX_FRAME_DATA {
        return DecodeResult::Invalid(start + 1);
    }

    let mut frame_data = Vec::with_capacity(len);
    for _ in 0..len {
        frame_data.push(next_byte!());
    }
    let received = next_byte!();

    if checksum(&frame_data) != received {
        tracing::debug!(
            expected = checksum(&frame_data),
            received,
            "API frame checksum mismatch"
        );
        return DecodeResult::Invalid(start + 1);
    }

    match ApiFrame::parse(&frame_data) {
        Ok(frame) => DecodeResult::Frame(frame, reader.pos),
        Err(e) => {
            tracing::debug!(error = %e, "discarding malformed API frame");
            DecodeResult::Invalid(reader.pos)
        }
    }
}

/// Maximum buffered bytes before the decoder discards its input.
const MAX_BUFFERED: usize = 4096;

/// Incremental decoder for a byte stream of API frames.
///
/// Feed raw transport reads with [`push`](Self::push) and drain frames
/// with [`next_frame`](Self::next_frame).
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    mode: ApiMode,
}

impl FrameDecoder {
    /// Create a decoder for the given API mode.
    pub fn new(mode: ApiMode) -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(256),
            mode,
        }
    }

    /// Append raw bytes read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_BUFFERED {
            tracing::warn!(len = self.buf.len(), "decoder buffer overflow, resetting");
            self.buf.clear();
        }
    }

    /// Decode the next complete frame, skipping noise and bad frames.
    pub fn next_frame(&mut self) -> Option<ApiFrame> {
        loop {
            match decode_frame(&self.buf, self.mode) {
                DecodeResult::Frame(frame, consumed) => {
                    let _ = self.buf.split_to(consumed);
                    return Some(frame);
                }
                DecodeResult::Invalid(consumed) => {
                    tracing::trace!(discarded = consumed, "skipping invalid bytes");
                    let _ = self.buf.split_to(consumed);
                }
                DecodeResult::Incomplete => return None,
            }
        }
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AtCommand, AtStatus};

    fn at_response(frame_id: u8, data: &[u8]) -> ApiFrame {
        ApiFrame::AtCommandResponse {
            frame_id,
            command: AtCommand::new("NI").unwrap(),
            status: AtStatus::Ok,
            data: data.to_vec(),
        }
    }

    #[test]
    fn checksum_reference_values() {
        assert_eq!(checksum(&[0x08, 0x52, b'N', b'J']), 0x0D);
        assert_eq!(checksum(&[0x89, 0x01, 0x00]), 0x75);
        assert_eq!(checksum(&[]), 0xFF);
    }

    #[test]
    fn encode_unescaped() {
        let frame = ApiFrame::AtCommand {
            frame_id: 0x52,
            command: AtCommand::new("NJ").unwrap(),
            parameter: vec![],
        };
        assert_eq!(
            encode_frame(&frame, ApiMode::Unescaped),
            vec![0x7E, 0x00, 0x04, 0x08, 0x52, 0x4E, 0x4A, 0x0D]
        );
    }

    #[test]
    fn encode_escaped_control_bytes() {
        // Frame data with every byte that needs escaping.
        let encoded = encode_frame_data(&[0x7E, 0x7D, 0x11, 0x13], ApiMode::Escaped);
        assert_eq!(
            encoded,
            vec![0x7E, 0x00, 0x04, 0x7D, 0x5E, 0x7D, 0x5D, 0x7D, 0x31, 0x7D, 0x33, 0xE0]
        );
    }

    #[test]
    fn escaped_checksum_is_escaped() {
        // Frame data summing to 0xEE gives checksum 0x11 (XON).
        let encoded = encode_frame_data(&[0xEE], ApiMode::Escaped);
        assert_eq!(encoded, vec![0x7E, 0x00, 0x01, 0xEE, 0x7D, 0x31]);
        assert!(matches!(
            decode_frame(&encoded, ApiMode::Escaped),
            DecodeResult::Frame(ApiFrame::Unknown { frame_type: 0xEE, .. }, 6)
        ));
    }

    #[test]
    fn decode_escaped_frame() {
        let frame = at_response(0x7D, &[0x13, 0x7E]);
        let encoded = encode_frame(&frame, ApiMode::Escaped);
        match decode_frame(&encoded, ApiMode::Escaped) {
            DecodeResult::Frame(decoded, consumed) => {
                assert_eq!(decoded, frame);
                assert_eq!(consumed, encoded.len());
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_skips_leading_noise() {
        let mut buf = vec![0x00, 0x42, 0x99];
        buf.extend(encode_frame(&at_response(3, b"A"), ApiMode::Unescaped));
        match decode_frame(&buf, ApiMode::Unescaped) {
            DecodeResult::Frame(frame, consumed) => {
                assert_eq!(frame, at_response(3, b"A"));
                assert_eq!(consumed, buf.len());
            }
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_incomplete() {
        let encoded = encode_frame(&at_response(1, b"NODE"), ApiMode::Unescaped);
        for cut in 0..encoded.len() {
            assert_eq!(
                decode_frame(&encoded[..cut], ApiMode::Unescaped),
                DecodeResult::Incomplete,
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn decode_pure_noise_is_invalid() {
        assert_eq!(
            decode_frame(&[0x01, 0x02, 0x03], ApiMode::Unescaped),
            DecodeResult::Invalid(3)
        );
    }

    #[test]
    fn decode_bad_checksum_skips_delimiter() {
        let mut encoded = encode_frame(&at_response(1, b""), ApiMode::Unescaped);
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert_eq!(
            decode_frame(&encoded, ApiMode::Unescaped),
            DecodeResult::Invalid(1)
        );
    }

    #[test]
    fn decode_truncated_escaped_frame_restarts() {
        let first = encode_frame(&at_response(1, b"XYZ"), ApiMode::Escaped);
        let second = encode_frame(&at_response(2, b""), ApiMode::Escaped);
        let mut buf = first[..5].to_vec();
        buf.extend_from_slice(&second);

        assert_eq!(decode_frame(&buf, ApiMode::Escaped), DecodeResult::Invalid(5));
        match decode_frame(&buf[5..], ApiMode::Escaped) {
            DecodeResult::Frame(frame, _) => assert_eq!(frame, at_response(2, b"")),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_zero_length_is_invalid() {
        assert_eq!(
            decode_frame(&[0x7E, 0x00, 0x00, 0xFF], ApiMode::Unescaped),
            DecodeResult::Invalid(1)
        );
    }

    #[test]
    fn api_mode_values() {
        assert_eq!(ApiMode::try_from(1), Ok(ApiMode::Unescaped));
        assert_eq!(ApiMode::try_from(2), Ok(ApiMode::Escaped));
        assert_eq!(ApiMode::try_from(3), Err(3));
        assert_eq!(ApiMode::Escaped.as_u8(), 2);
        assert_eq!(ApiMode::default(), ApiMode::Unescaped);
    }

    #[test]
    fn decoder_handles_split_reads() {
        let mut decoder = FrameDecoder::new(ApiMode::Escaped);
        let a = encode_frame(&at_response(1, &[0x7E]), ApiMode::Escaped);
        let b = encode_frame(&at_response(2, &[0x11]), ApiMode::Escaped);
        let mut stream = a.clone();
        stream.extend_from_slice(&b);

        let (head, tail) = stream.split_at(a.len() + 2);
        decoder.push(head);
        assert_eq!(decoder.next_frame(), Some(at_response(1, &[0x7E])));
        assert_eq!(decoder.next_frame(), None);

        decoder.push(tail);
        assert_eq!(decoder.next_frame(), Some(at_response(2, &[0x11])));
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decoder_recovers_after_corruption() {
        let mut decoder = FrameDecoder::new(ApiMode::Unescaped);
        let mut bad = encode_frame(&at_response(1, b""), ApiMode::Unescaped);
        let last = bad.len() - 1;
        bad[last] = bad[last].wrapping_add(1);
        decoder.push(&bad);
        decoder.push(&encode_frame(&at_response(2, b""), ApiMode::Unescaped));

        assert_eq!(decoder.next_frame(), Some(at_response(2, b"")));
    }
}
