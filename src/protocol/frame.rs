//! WebSocket frame codec (RFC 6455 Section 5.2).
//!
//! Stateless: [`decode`] looks at a byte slice and either produces one frame
//! plus the number of bytes it occupied, or reports how many more bytes are
//! needed. It never consumes anything itself; the caller advances its buffer.

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask_fast, random_mask};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest payload that still fits the 7-bit length field.
const LEN_7BIT_MAX: usize = 125;

/// Largest payload that still fits the 16-bit extended length field.
const LEN_16BIT_MAX: usize = 0xFFFF;

/// Marker values of the 7-bit length field.
const LEN_MARKER_16: u8 = 126;
const LEN_MARKER_64: u8 = 127;

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    fin: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload_len: usize,
    header_len: usize,
}

/// Parse and validate a frame header.
///
/// The payload limit is enforced as soon as the length field is readable, so
/// an oversized frame is refused before its payload is buffered.
fn parse_header(buf: &[u8], max_payload: usize) -> Result<FrameHeader> {
    if buf.len() < 2 {
        return Err(Error::IncompleteFrame {
            needed: 2 - buf.len(),
        });
    }

    let byte0 = buf[0];
    let byte1 = buf[1];

    // Byte 0: FIN(1) RSV(3) OPCODE(4)
    let fin = (byte0 & 0x80) != 0;
    if byte0 & 0x70 != 0 {
        return Err(Error::ReservedBitsSet);
    }
    let opcode = OpCode::from_u8(byte0 & 0x0F)?;

    // Byte 1: MASK(1) LENGTH(7)
    let masked = (byte1 & 0x80) != 0;
    let len7 = byte1 & 0x7F;

    let (announced, len_end) = match len7 {
        LEN_MARKER_16 => {
            if buf.len() < 4 {
                return Err(Error::IncompleteFrame {
                    needed: 4 - buf.len(),
                });
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        LEN_MARKER_64 => {
            if buf.len() < 10 {
                return Err(Error::IncompleteFrame {
                    needed: 10 - buf.len(),
                });
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(raw);
            if len >> 63 != 0 {
                return Err(Error::InvalidFrame(
                    "64-bit payload length has its most significant bit set".into(),
                ));
            }
            (len, 10)
        }
        short => (u64::from(short), 2),
    };

    if opcode.is_control() {
        if !fin {
            return Err(Error::FragmentedControlFrame);
        }
        if announced > MAX_CONTROL_FRAME_PAYLOAD as u64 {
            return Err(Error::ControlFrameTooLarge(announced as usize));
        }
    }

    if announced > max_payload as u64 {
        return Err(Error::FrameTooLarge {
            size: announced,
            max: max_payload,
        });
    }
    // Bounded by max_payload, which is a usize.
    let payload_len = announced as usize;

    let header_len = if masked { len_end + 4 } else { len_end };
    if buf.len() < header_len {
        return Err(Error::IncompleteFrame {
            needed: header_len - buf.len(),
        });
    }

    let mask = masked.then(|| [buf[len_end], buf[len_end + 1], buf[len_end + 2], buf[len_end + 3]]);

    Ok(FrameHeader {
        fin,
        opcode,
        mask,
        payload_len,
        header_len,
    })
}

/// A WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                  Masking key (if MASK set)                    |
/// +---------------------------------------------------------------+
/// |                         Payload data                          |
/// +---------------------------------------------------------------+
/// ```
///
/// The payload held here is always unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key the frame arrived with, if any.
    pub mask: Option<[u8; 4]>,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            mask: None,
            payload,
        }
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = if let Some(code) = code {
            let mut data = code.to_be_bytes().to_vec();
            data.extend_from_slice(reason.as_bytes());
            data
        } else {
            Vec::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Whether the frame arrived masked.
    #[inline]
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Status code carried by a close frame, if present.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode == OpCode::Close && self.payload.len() >= 2 {
            Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
        } else {
            None
        }
    }
}

/// Outcome of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied.
    Frame(Frame, usize),
    /// More bytes are needed; nothing should be consumed.
    Incomplete {
        /// Lower bound on the number of missing bytes.
        needed: usize,
    },
}

/// Decode one frame from the front of `buf`.
///
/// # Errors
///
/// - `Error::FrameTooLarge` if the announced payload exceeds `max_payload`
/// - `Error::ReservedBitsSet`, `Error::ReservedOpcode`,
///   `Error::FragmentedControlFrame`, `Error::ControlFrameTooLarge` or
///   `Error::InvalidFrame` for malformed headers
pub fn decode(buf: &[u8], max_payload: usize) -> Result<Decoded> {
    let header = match parse_header(buf, max_payload) {
        Ok(header) => header,
        Err(Error::IncompleteFrame { needed }) => return Ok(Decoded::Incomplete { needed }),
        Err(e) => return Err(e),
    };

    let total = header.header_len + header.payload_len;
    if buf.len() < total {
        return Ok(Decoded::Incomplete {
            needed: total - buf.len(),
        });
    }

    let mut payload = buf[header.header_len..total].to_vec();
    if let Some(key) = header.mask {
        apply_mask_fast(&mut payload, key);
    }

    let frame = Frame {
        fin: header.fin,
        opcode: header.opcode,
        mask: header.mask,
        payload,
    };
    Ok(Decoded::Frame(frame, total))
}

/// Encode an unfragmented, client-masked frame with a fresh random key.
#[must_use]
pub fn encode(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    encode_with_mask(opcode, payload, Some(random_mask()))
}

/// Encode an unfragmented frame with an explicit masking key.
#[must_use]
pub fn encode_with_mask(opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = write_header(true, opcode, payload.len(), mask);
    let start = out.len();
    out.extend_from_slice(payload);
    if let Some(key) = mask {
        apply_mask_fast(&mut out[start..], key);
    }
    out
}

fn header_size(payload_len: usize, masked: bool) -> usize {
    let extended = if payload_len <= LEN_7BIT_MAX {
        0
    } else if payload_len <= LEN_16BIT_MAX {
        2
    } else {
        8
    };
    2 + extended + if masked { 4 } else { 0 }
}

fn write_header(fin: bool, opcode: OpCode, payload_len: usize, mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_size(payload_len, mask.is_some()) + payload_len);

    let mut byte0 = opcode.as_u8();
    if fin {
        byte0 |= 0x80;
    }
    out.push(byte0);

    let mask_bit = if mask.is_some() { 0x80 } else { 0 };
    if payload_len <= LEN_7BIT_MAX {
        out.push(mask_bit | payload_len as u8);
    } else if payload_len <= LEN_16BIT_MAX {
        out.push(mask_bit | LEN_MARKER_16);
        out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | LEN_MARKER_64);
        out.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    if let Some(key) = mask {
        out.extend_from_slice(&key);
    }
    out
}
