//! WebSocket frame encoding and decoding (RFC 6455, section 5).
//!
//! ```text
//!  0                   1                   2                   3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |  (if payload len==126/127)    |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |    Masking-key (0 or 4 bytes, present when MASK is set)       |
//! +---------------------------------------------------------------+
//! |                        Payload data                           |
//! +---------------------------------------------------------------+
//! ```
//!
//! Everything here is pure: no IO, no state. Clients must mask their frames;
//! server frames are always sent unmasked.

use crate::error::{ProtocolError, ProtocolResult};

const FIN_BIT: u8 = 0x80;
const RSV_BITS: u8 = 0x70;
const MASK_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0f;
const LEN_BITS: u8 = 0x7f;

/// 7-bit length marker announcing a 16-bit extended length.
const LEN_16_MARKER: u8 = 126;
/// 7-bit length marker announcing a 64-bit extended length.
const LEN_64_MARKER: u8 = 127;

/// Largest payload that fits the single-byte length tier.
pub const MAX_SHORT_PAYLOAD: usize = 125;

/// Control frames carry at most this many payload bytes.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Close status codes used by the relay.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Any of the reserved values 0x3-0x7 and 0xB-0xF.
    Reserved(u8),
}

impl Opcode {
    pub fn from_u8(value: u8) -> Self {
        match value & OPCODE_BITS {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::Reserved(value) => value & OPCODE_BITS,
        }
    }

    /// Returns `true` for Close, Ping and Pong.
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    /// RSV1-3 as a 3-bit value; non-zero only with a negotiated extension.
    pub rsv: u8,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    /// Declared payload length, as read from the wire.
    pub payload_len: u64,
    /// Bytes taken by the fixed header, extended length and mask key.
    pub header_len: usize,
}

impl FrameHeader {
    /// Total size of the frame on the wire.
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Number of header bytes needed before the payload can start.
///
/// Needs only the first two bytes; returns 2 when fewer are available.
fn required_header_len(buf: &[u8]) -> usize {
    if buf.len() < 2 {
        return 2;
    }
    let extended = match buf[1] & LEN_BITS {
        LEN_16_MARKER => 2,
        LEN_64_MARKER => 8,
        _ => 0,
    };
    let mask = if buf[1] & MASK_BIT != 0 { 4 } else { 0 };
    2 + extended + mask
}

/// Discovers the header at the front of `buf`.
///
/// Returns `None` when the buffer does not yet hold the whole header
/// (fixed bytes, extended length and mask key). The payload itself need not
/// be present.
pub fn parse_header(buf: &[u8]) -> Option<FrameHeader> {
    let header_len = required_header_len(buf);
    if buf.len() < header_len {
        return None;
    }

    let fin = buf[0] & FIN_BIT != 0;
    let rsv = (buf[0] & RSV_BITS) >> 4;
    let opcode = Opcode::from_u8(buf[0]);
    let masked = buf[1] & MASK_BIT != 0;

    let (payload_len, mut offset) = match buf[1] & LEN_BITS {
        LEN_16_MARKER => (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4),
        LEN_64_MARKER => {
            let mut len = [0u8; 8];
            len.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(len), 10)
        }
        short => (u64::from(short), 2),
    };

    let mask = if masked {
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[offset..offset + 4]);
        offset += 4;
        Some(key)
    } else {
        None
    };

    debug_assert_eq!(offset, header_len);

    Some(FrameHeader {
        fin,
        rsv,
        opcode,
        mask,
        payload_len,
        header_len,
    })
}

/// XORs `payload` in place with the 4-byte key. Applying it twice restores
/// the original bytes.
pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Decodes exactly one complete frame.
///
/// Bytes past the declared frame length are ignored.
pub fn decode_frame(frame: &[u8]) -> ProtocolResult<Frame> {
    let header = parse_header(frame).ok_or(ProtocolError::IncompleteFrame {
        expected: required_header_len(frame),
        received: frame.len(),
    })?;

    let total = usize::try_from(header.frame_len()).map_err(|_| ProtocolError::FrameTooLarge {
        size: header.payload_len,
        max: usize::MAX as u64,
    })?;
    if frame.len() < total {
        return Err(ProtocolError::IncompleteFrame {
            expected: total,
            received: frame.len(),
        });
    }

    let mut payload = frame[header.header_len..total].to_vec();
    if let Some(mask) = header.mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Frame {
        fin: header.fin,
        opcode: header.opcode,
        payload,
    })
}

/// Decodes one complete frame and returns its payload as text.
///
/// The opcode and FIN bit are not checked; use [`crate::MessageAssembler`]
/// when they matter.
pub fn decode_text(frame: &[u8]) -> ProtocolResult<String> {
    let frame = decode_frame(frame)?;
    Ok(String::from_utf8(frame.payload)?)
}

fn write_header(out: &mut Vec<u8>, opcode: Opcode, mask: Option<[u8; 4]>, len: usize) {
    out.push(FIN_BIT | opcode.as_u8());

    let mask_bit = if mask.is_some() { MASK_BIT } else { 0 };
    if len <= MAX_SHORT_PAYLOAD {
        out.push(mask_bit | len as u8);
    } else if let Ok(len) = u16::try_from(len) {
        out.push(mask_bit | LEN_16_MARKER);
        out.extend_from_slice(&len.to_be_bytes());
    } else {
        out.push(mask_bit | LEN_64_MARKER);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    if let Some(key) = mask {
        out.extend_from_slice(&key);
    }
}

fn header_capacity(len: usize, masked: bool) -> usize {
    let extended = if len <= MAX_SHORT_PAYLOAD {
        0
    } else if len <= u16::MAX as usize {
        2
    } else {
        8
    };
    let mask = if masked { 4 } else { 0 };
    2 + extended + mask + len
}

/// Encodes a final (FIN=1), unmasked frame as sent by the server.
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_capacity(payload.len(), false));
    write_header(&mut out, opcode, None, payload.len());
    out.extend_from_slice(payload);
    out
}

/// Encodes `text` as a single unmasked text frame (first byte `0x81`).
///
/// # Example
///
/// ```rust
/// use consultrelay_protocol::{decode_text, encode_text};
///
/// let frame = encode_text("hi");
/// assert_eq!(frame, [0x81, 0x02, b'h', b'i']);
/// assert_eq!(decode_text(&frame).unwrap(), "hi");
/// ```
pub fn encode_text(text: &str) -> Vec<u8> {
    encode_frame(Opcode::Text, text.as_bytes())
}

/// Encodes a close frame carrying `code` and a reason trimmed to fit a
/// control frame.
pub fn encode_close(code: u16, reason: &str) -> Vec<u8> {
    let mut cut = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut payload = Vec::with_capacity(2 + cut);
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(&reason.as_bytes()[..cut]);
    encode_frame(Opcode::Close, &payload)
}

/// Encodes a final frame masked with `mask`, as a client would send it.
pub fn encode_masked(opcode: Opcode, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_capacity(payload.len(), true));
    write_header(&mut out, opcode, Some(mask), payload.len());
    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], mask);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    #[test]
    fn decodes_rfc_unmasked_hello() {
        let frame = [0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f];
        assert_eq!(decode_text(&frame).unwrap(), "Hello");
    }

    #[test]
    fn decodes_rfc_masked_hello() {
        let frame = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let decoded = decode_frame(&frame).unwrap();
        assert!(decoded.fin);
        assert_eq!(decoded.opcode, Opcode::Text);
        assert_eq!(decoded.payload, b"Hello");
    }

    #[test]
    fn masked_encoding_matches_rfc() {
        let frame = encode_masked(Opcode::Text, b"Hello", MASK);
        assert_eq!(
            frame,
            [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn roundtrip_server_and_client_frames() {
        for text in ["", "a", "{\"type\":\"offer\"}", "héllo wörld ✓"] {
            assert_eq!(decode_text(&encode_text(text)).unwrap(), text);
            let masked = encode_masked(Opcode::Text, text.as_bytes(), MASK);
            assert_eq!(decode_text(&masked).unwrap(), text);
        }
    }

    #[test]
    fn server_frames_are_unmasked_final_text() {
        let frame = encode_text("x");
        assert_eq!(frame[0], 0x81);
        assert_eq!(frame[1] & MASK_BIT, 0);
    }

    #[test]
    fn length_tier_125_uses_single_byte() {
        let text = "a".repeat(125);
        let frame = encode_text(&text);
        assert_eq!(frame[1], 125);
        assert_eq!(frame.len(), 2 + 125);
        assert_eq!(decode_text(&frame).unwrap().len(), 125);
    }

    #[test]
    fn length_tier_126_uses_16_bit() {
        let text = "a".repeat(126);
        let frame = encode_text(&text);
        assert_eq!(frame[1], 126);
        assert_eq!(&frame[2..4], &[0x00, 0x7e]);
        assert_eq!(frame.len(), 4 + 126);
        assert_eq!(decode_text(&frame).unwrap(), text);
    }

    #[test]
    fn length_tier_65535_stays_16_bit() {
        let text = "b".repeat(65535);
        let frame = encode_text(&text);
        assert_eq!(frame[1], 126);
        assert_eq!(&frame[2..4], &[0xff, 0xff]);
        assert_eq!(decode_text(&frame).unwrap().len(), 65535);
    }

    #[test]
    fn length_tier_65536_uses_64_bit() {
        let text = "c".repeat(65536);
        let frame = encode_text(&text);
        assert_eq!(frame[1], 127);
        assert_eq!(&frame[2..10], &[0, 0, 0, 0, 0, 1, 0, 0]);
        assert_eq!(frame.len(), 10 + 65536);
        assert_eq!(decode_text(&frame).unwrap(), text);
    }

    #[test]
    fn masked_extended_lengths_roundtrip() {
        for len in [126usize, 65536] {
            let payload = vec![b'z'; len];
            let frame = encode_masked(Opcode::Text, &payload, MASK);
            let header = parse_header(&frame).unwrap();
            assert_eq!(header.payload_len, len as u64);
            assert_eq!(header.mask, Some(MASK));
            assert_eq!(decode_frame(&frame).unwrap().payload, payload);
        }
    }

    #[test]
    fn parse_header_needs_full_header() {
        let frame = encode_masked(Opcode::Text, &[0u8; 300], MASK);
        // 2 fixed + 2 extended + 4 mask
        for cut in 0..8 {
            assert!(parse_header(&frame[..cut]).is_none(), "cut at {cut}");
        }
        let header = parse_header(&frame[..8]).unwrap();
        assert_eq!(header.header_len, 8);
        assert_eq!(header.payload_len, 300);
    }

    #[test]
    fn header_exposes_reserved_bits() {
        let mut frame = encode_masked(Opcode::Text, b"x", MASK);
        assert_eq!(parse_header(&frame).unwrap().rsv, 0);

        frame[0] |= 0x40; // RSV1
        assert_eq!(parse_header(&frame).unwrap().rsv, 0b100);
        frame[0] |= 0x10; // RSV3
        assert_eq!(parse_header(&frame).unwrap().rsv, 0b101);
    }

    #[test]
    fn decode_truncated_payload() {
        let frame = encode_text("hello");
        let result = decode_frame(&frame[..4]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteFrame {
                expected: 7,
                received: 4
            })
        ));
    }

    #[test]
    fn decode_truncated_header() {
        let result = decode_frame(&[0x81]);
        assert!(matches!(
            result,
            Err(ProtocolError::IncompleteFrame { expected: 2, .. })
        ));
    }

    #[test]
    fn decode_invalid_utf8() {
        let frame = encode_frame(Opcode::Text, &[0xff, 0xfe]);
        assert!(matches!(
            decode_text(&frame),
            Err(ProtocolError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut bytes = encode_text("one");
        bytes.extend(encode_text("two"));
        assert_eq!(decode_text(&bytes).unwrap(), "one");
    }

    #[test]
    fn opcode_conversions() {
        for op in [
            Opcode::Continuation,
            Opcode::Text,
            Opcode::Binary,
            Opcode::Close,
            Opcode::Ping,
            Opcode::Pong,
        ] {
            assert_eq!(Opcode::from_u8(op.as_u8()), op);
        }
        assert_eq!(Opcode::from_u8(0x3), Opcode::Reserved(0x3));
        assert!(Opcode::Ping.is_control());
        assert!(!Opcode::Text.is_control());
        assert!(Opcode::Reserved(0xB).is_control());
    }

    #[test]
    fn close_frame_layout() {
        let frame = encode_close(close_code::NORMAL, "bye");
        assert_eq!(frame[0], 0x88);
        assert_eq!(frame[1], 5);
        assert_eq!(&frame[2..4], &1000u16.to_be_bytes());
        assert_eq!(&frame[4..], b"bye");
    }

    #[test]
    fn close_reason_is_trimmed_on_char_boundary() {
        let reason = "é".repeat(100);
        let frame = encode_close(close_code::GOING_AWAY, &reason);
        let decoded = decode_frame(&frame).unwrap();
        assert!(decoded.payload.len() <= MAX_CONTROL_PAYLOAD);
        assert!(String::from_utf8(decoded.payload[2..].to_vec()).is_ok());
    }
}
