//! WebSocket frame encoding and decoding.
//!
//! Frames follow the RFC 6455 wire layout:
//!
//! ```text
//! [fin|rsv:3|opcode:4][mask:1|len:7][ext-len:0/2/8][mask-key:0/4][payload]
//! ```
//!
//! A 7-bit length of 0..=125 is the payload length itself, 126 means a
//! big-endian `u16` follows, 127 means a big-endian `u64` follows. When the
//! mask bit is set a 4-byte key precedes the payload and every payload byte is
//! XOR-ed with `key[i % 4]`.
//!
//! Frames sent by a client must be masked; frames sent by a server must not.
//! The decoder accepts both so the same code serves either direction.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Default ceiling on a single frame's payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest possible header: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub const MAX_HEADER_SIZE: usize = 14;

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const OPCODE_BITS: u8 = 0x0F;
const MASK_BIT: u8 = 0x80;
const LENGTH_BITS: u8 = 0x7F;
const LENGTH_16: u8 = 126;
const LENGTH_64: u8 = 127;

/// Frame opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Close, Ping and Pong are control opcodes.
    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A single decoded (unmasked) frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl Frame {
    /// Create a final frame with the given opcode and payload.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            payload: payload.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, Bytes::from(text.into()))
    }

    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Build a close frame carrying a status code and a UTF-8 reason.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(Opcode::Close, payload.freeze())
    }

    /// View the payload as UTF-8 text.
    pub fn as_text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }

    /// Status code of a close frame, if it carries one.
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Reason text of a close frame, if it carries a valid one.
    pub fn close_reason(&self) -> Option<&str> {
        if self.opcode != Opcode::Close {
            return None;
        }
        self.payload
            .get(2..)
            .and_then(|reason| std::str::from_utf8(reason).ok())
            .filter(|reason| !reason.is_empty())
    }
}

/// A parsed frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    pub payload_len: u64,
    /// Bytes occupied by the header, including extended length and mask key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Total bytes the frame occupies on the wire.
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// XOR `payload` in place with the 4-byte masking key.
///
/// Masking is its own inverse: applying the same key twice restores the
/// original bytes.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Encode a frame, masking the payload when a key is given.
pub fn encode_frame(frame: &Frame, mask: Option<[u8; 4]>) -> BytesMut {
    let len = frame.payload.len();
    let mut out = BytesMut::with_capacity(MAX_HEADER_SIZE + len);

    let fin = if frame.fin { FIN_BIT } else { 0 };
    out.put_u8(fin | frame.opcode.as_u8());

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    if len <= MAX_CONTROL_PAYLOAD {
        out.put_u8(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.put_u8(mask_bit | LENGTH_16);
        out.put_u16(len as u16);
    } else {
        out.put_u8(mask_bit | LENGTH_64);
        out.put_u64(len as u64);
    }

    match mask {
        Some(key) => {
            out.put_slice(&key);
            let start = out.len();
            out.put_slice(&frame.payload);
            apply_mask(&mut out[start..], key);
        }
        None => out.put_slice(&frame.payload),
    }

    out
}

/// Parse a frame header from the front of `data`.
///
/// Returns `Ok(None)` when more bytes are needed to decide.
pub fn parse_frame_header(data: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
    if data.len() < 2 {
        return Ok(None);
    }

    let first = data[0];
    let second = data[1];

    if first & RSV_BITS != 0 {
        return Err(FrameError::ReservedBits(first & RSV_BITS));
    }
    let raw_opcode = first & OPCODE_BITS;
    let opcode = Opcode::from_u8(raw_opcode).ok_or(FrameError::UnknownOpcode(raw_opcode))?;
    let fin = first & FIN_BIT != 0;
    let masked = second & MASK_BIT != 0;

    let (payload_len, mut offset) = match second & LENGTH_BITS {
        LENGTH_16 => {
            if data.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([data[2], data[3]]) as u64, 4)
        }
        LENGTH_64 => {
            if data.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[2..10]);
            (u64::from_be_bytes(raw), 10)
        }
        short => (short as u64, 2),
    };

    if opcode.is_control() {
        if !fin {
            return Err(FrameError::FragmentedControl);
        }
        if payload_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(FrameError::ControlTooLarge(payload_len));
        }
    }

    let mask = if masked {
        if data.len() < offset + 4 {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&data[offset..offset + 4]);
        offset += 4;
        Some(key)
    } else {
        None
    };

    Ok(Some(FrameHeader {
        fin,
        opcode,
        mask,
        payload_len,
        header_len: offset,
    }))
}

/// Decode one frame from the front of `buf`.
///
/// On success the frame's bytes are consumed from `buf` and the payload is
/// unmasked. Returns `Ok(None)` and leaves `buf` untouched when the frame is
/// not yet complete.
pub fn decode_frame(buf: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>, FrameError> {
    let Some(header) = parse_frame_header(buf)? else {
        return Ok(None);
    };

    if header.payload_len > max_payload as u64 {
        return Err(FrameError::TooLarge {
            len: header.payload_len,
            max: max_payload,
        });
    }

    let payload_len = header.payload_len as usize;
    if buf.len() < header.header_len + payload_len {
        return Ok(None);
    }

    buf.advance(header.header_len);
    let mut payload = buf.split_to(payload_len);
    if let Some(key) = header.mask {
        apply_mask(&mut payload, key);
    }

    Ok(Some(Frame {
        fin: header.fin,
        opcode: header.opcode,
        payload: payload.freeze(),
    }))
}

/// Describe the incomplete frame left in `buf` when its source has closed.
///
/// Used to report a partial frame instead of silently dropping it.
pub fn truncated(buf: &[u8]) -> FrameError {
    let expected = parse_frame_header(buf)
        .ok()
        .flatten()
        .map(|header| header.frame_len());
    FrameError::Truncated {
        expected,
        available: buf.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZES: &[usize] = &[0, 1, 125, 126, 65535, 65536];

    fn payload_of(len: usize) -> Bytes {
        (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_round_trip_unmasked_across_length_forms() {
        for &len in SIZES {
            let frame = Frame::binary(payload_of(len));
            let mut buf = encode_frame(&frame, None);

            let decoded = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
                .unwrap()
                .expect("complete frame");

            assert_eq!(decoded, frame, "payload length {len}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_round_trip_masked_across_length_forms() {
        let key = [0xA1, 0x02, 0x7F, 0xFE];
        for &len in SIZES {
            let frame = Frame::binary(payload_of(len));
            let mut buf = encode_frame(&frame, Some(key));

            assert_eq!(buf[1] & MASK_BIT, MASK_BIT);

            let decoded = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
                .unwrap()
                .expect("complete frame");
            assert_eq!(decoded.payload, frame.payload, "payload length {len}");
        }
    }

    #[test]
    fn test_length_indicator_selection() {
        let cases: &[(usize, u8, usize)] = &[
            (125, 125, 2),
            (126, LENGTH_16, 4),
            (65535, LENGTH_16, 4),
            (65536, LENGTH_64, 10),
        ];
        for &(len, indicator, header_len) in cases {
            let buf = encode_frame(&Frame::binary(payload_of(len)), None);
            assert_eq!(buf[1] & LENGTH_BITS, indicator, "payload length {len}");

            let header = parse_frame_header(&buf).unwrap().unwrap();
            assert_eq!(header.header_len, header_len);
            assert_eq!(header.payload_len, len as u64);
        }
    }

    #[test]
    fn test_mask_is_self_inverse() {
        let keys = [[0, 0, 0, 0], [0xFF, 0xFF, 0xFF, 0xFF], [1, 2, 3, 4], [0x37, 0xFA, 0x21, 0x3D]];
        for key in keys {
            for len in [0usize, 1, 2, 3, 4, 5, 7, 13, 1021] {
                let original = payload_of(len).to_vec();
                let mut data = original.clone();
                apply_mask(&mut data, key);
                apply_mask(&mut data, key);
                assert_eq!(data, original, "key {key:?} length {len}");
            }
        }
    }

    #[test]
    fn test_rfc_masked_hello() {
        // RFC 6455 section 5.7: a single-frame masked text message "Hello".
        let mut buf = BytesMut::from(
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58][..],
        );
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();

        assert_eq!(frame.opcode, Opcode::Text);
        assert!(frame.fin);
        assert_eq!(frame.as_text().unwrap(), "Hello");
    }

    #[test]
    fn test_encode_matches_rfc_masked_hello() {
        let buf = encode_frame(&Frame::text("Hello"), Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(
            &buf[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let encoded = encode_frame(&Frame::text("{\"type\":\"sync-patch\"}"), None);

        for cut in 0..encoded.len() {
            let mut buf = BytesMut::from(&encoded[..cut]);
            assert_eq!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap(), None);
            assert_eq!(buf.len(), cut, "partial input must not be consumed");
        }
    }

    #[test]
    fn test_consecutive_frames_decode_in_order() {
        let mut buf = encode_frame(&Frame::text("one"), None);
        buf.extend_from_slice(&encode_frame(&Frame::ping("p"), None));
        buf.extend_from_slice(&encode_frame(&Frame::text("two"), None)[..3]);

        let first = decode_frame(&mut buf, 1024).unwrap().unwrap();
        let second = decode_frame(&mut buf, 1024).unwrap().unwrap();
        let third = decode_frame(&mut buf, 1024).unwrap();

        assert_eq!(first.as_text().unwrap(), "one");
        assert_eq!(second.opcode, Opcode::Ping);
        assert_eq!(third, None);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_truncated_reports_expected_length() {
        let encoded = encode_frame(&Frame::binary(payload_of(300)), None);
        let err = truncated(&encoded[..100]);

        assert_eq!(
            err,
            FrameError::Truncated {
                expected: Some(304),
                available: 100,
            }
        );
        assert_eq!(
            truncated(&encoded[..1]),
            FrameError::Truncated {
                expected: None,
                available: 1,
            }
        );
    }

    #[test]
    fn test_close_frame_code_and_reason() {
        let frame = Frame::close(1001, "going away");
        let mut buf = encode_frame(&frame, None);
        let decoded = decode_frame(&mut buf, 1024).unwrap().unwrap();

        assert_eq!(decoded.close_code(), Some(1001));
        assert_eq!(decoded.close_reason(), Some("going away"));
        assert_eq!(Frame::text("x").close_code(), None);
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let result = parse_frame_header(&[0xC1, 0x00]);
        assert_eq!(result, Err(FrameError::ReservedBits(0x40)));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let result = parse_frame_header(&[0x83, 0x00]);
        assert_eq!(result, Err(FrameError::UnknownOpcode(0x3)));
    }

    #[test]
    fn test_control_frame_constraints() {
        assert_eq!(
            parse_frame_header(&[0x09, 0x00]),
            Err(FrameError::FragmentedControl)
        );
        assert_eq!(
            parse_frame_header(&[0x89, LENGTH_16, 0x00, 0x7E]),
            Err(FrameError::ControlTooLarge(126))
        );
    }

    #[test]
    fn test_oversized_frame_rejected_before_payload_arrives() {
        let mut buf = BytesMut::from(&[0x82, LENGTH_64, 0, 0, 0, 1, 0, 0, 0, 0][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE);

        assert_eq!(
            result,
            Err(FrameError::TooLarge {
                len: 1 << 32,
                max: DEFAULT_MAX_FRAME_SIZE,
            })
        );
    }

    #[test]
    fn test_opcode_byte_mapping() {
        for opcode in [
            Opcode::Continuation,
            Opcode::Text,
            Opcode::Binary,
            Opcode::Close,
            Opcode::Ping,
            Opcode::Pong,
        ] {
            assert_eq!(Opcode::from_u8(opcode.as_u8()), Some(opcode));
        }
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Text.is_control());
    }
}
