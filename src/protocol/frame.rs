//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! Frames can be decoded from an in-memory buffer ([`Frame::parse`], which
//! reports how many more bytes it needs) or straight from a blocking stream
//! ([`Frame::read_from`], which reads exactly what the header declares).

use std::io::Read;

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask, apply_mask_fast, generate_mask};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest length the 64-bit length field may carry (MSB must be 0).
const MAX_WIRE_PAYLOAD: u64 = i64::MAX as u64;

/// Fields carried by the two mandatory header bytes.
#[derive(Debug, Clone, Copy)]
struct BaseHeader {
    fin: bool,
    rsv1: bool,
    rsv2: bool,
    rsv3: bool,
    opcode: OpCode,
    masked: bool,
    len7: u8,
}

impl BaseHeader {
    fn decode(byte0: u8, byte1: u8) -> Result<Self> {
        Ok(Self {
            fin: (byte0 & 0x80) != 0,
            rsv1: (byte0 & 0x40) != 0,
            rsv2: (byte0 & 0x20) != 0,
            rsv3: (byte0 & 0x10) != 0,
            opcode: OpCode::from_u8(byte0 & 0x0F)?,
            masked: (byte1 & 0x80) != 0,
            len7: byte1 & 0x7F,
        })
    }

    /// Number of extended length bytes that follow the base header.
    fn extended_len_size(&self) -> usize {
        match self.len7 {
            126 => 2,
            127 => 8,
            _ => 0,
        }
    }
}

fn extended_length(len7: u8, ext: &[u8]) -> Result<u64> {
    let len = match len7 {
        126 => u64::from(u16::from_be_bytes([ext[0], ext[1]])),
        127 => u64::from_be_bytes([
            ext[0], ext[1], ext[2], ext[3], ext[4], ext[5], ext[6], ext[7],
        ]),
        short => u64::from(short),
    };
    if len > MAX_WIRE_PAYLOAD {
        return Err(Error::ProtocolViolation(
            "MSB of 64-bit payload length must be 0".into(),
        ));
    }
    Ok(len)
}

fn payload_len_to_usize(len: u64, max: usize) -> Result<usize> {
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(Error::FrameTooLarge { size: len, max }),
    }
}

/// A WebSocket frame as defined in RFC 6455.
///
/// The payload is always held unmasked. `mask` records the key a decoded
/// frame arrived with; outgoing masking is chosen at encode time.
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
/// |                        Payload data                           |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless extension is negotiated.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 unless extension is negotiated.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 unless extension is negotiated.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload,
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
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

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Get the (unmasked) payload bytes.
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

    /// Whether the frame arrived with the MASK bit set.
    #[must_use]
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// The key the frame arrived with, if it was masked.
    #[must_use]
    pub fn mask_key(&self) -> Option<[u8; 4]> {
        self.mask
    }

    /// Parse a frame from a buffer.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    ///
    /// ## Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::ReservedOpcode` if a reserved opcode is used
    /// - `Error::FrameTooLarge` if the declared length does not fit in memory
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }
        let base = BaseHeader::decode(buf[0], buf[1])?;

        let ext_end = 2 + base.extended_len_size();
        if buf.len() < ext_end {
            return Err(Error::IncompleteFrame {
                needed: ext_end - buf.len(),
            });
        }
        let wire_len = extended_length(base.len7, &buf[2..ext_end])?;
        let payload_len = payload_len_to_usize(wire_len, usize::MAX - 14)?;

        let header_len = if base.masked { ext_end + 4 } else { ext_end };
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }
        let mask = base
            .masked
            .then(|| [buf[ext_end], buf[ext_end + 1], buf[ext_end + 2], buf[ext_end + 3]]);

        let total_size = header_len + payload_len;
        if buf.len() < total_size {
            return Err(Error::IncompleteFrame {
                needed: total_size - buf.len(),
            });
        }

        let mut payload = buf[header_len..total_size].to_vec();
        if let Some(key) = mask {
            apply_mask_fast(&mut payload, key);
        }

        Ok((Self::from_parts(base, mask, payload), total_size))
    }

    /// Read exactly one frame from a blocking stream.
    ///
    /// Reads the two mandatory header bytes, the extended length if any,
    /// the mask key if the MASK bit is set, then exactly the declared number
    /// of payload bytes. The payload is unmasked before returning.
    ///
    /// ## Errors
    ///
    /// - `Error::Connection` with kind `UnexpectedEof` if the stream ends
    ///   before the declared length is reached, or `ReadTimeout` on timeout
    /// - `Error::ReservedOpcode` if a reserved opcode is used
    /// - `Error::FrameTooLarge` if the declared length exceeds `max_payload`;
    ///   nothing is allocated for such a frame
    pub fn read_from<R: Read + ?Sized>(reader: &mut R, max_payload: usize) -> Result<Self> {
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).map_err(Error::read_failure)?;
        let base = BaseHeader::decode(head[0], head[1])?;

        let mut ext = [0u8; 8];
        let ext_size = base.extended_len_size();
        reader
            .read_exact(&mut ext[..ext_size])
            .map_err(Error::read_failure)?;
        let wire_len = extended_length(base.len7, &ext[..ext_size])?;
        let payload_len = payload_len_to_usize(wire_len, max_payload)?;

        let mask = if base.masked {
            let mut key = [0u8; 4];
            reader.read_exact(&mut key).map_err(Error::read_failure)?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).map_err(Error::read_failure)?;
        if let Some(key) = mask {
            apply_mask_fast(&mut payload, key);
        }

        Ok(Self::from_parts(base, mask, payload))
    }

    fn from_parts(base: BaseHeader, mask: Option<[u8; 4]>, payload: Vec<u8>) -> Self {
        Self {
            fin: base.fin,
            rsv1: base.rsv1,
            rsv2: base.rsv2,
            rsv3: base.rsv3,
            opcode: base.opcode,
            mask,
            payload,
        }
    }

    /// Validate the frame according to RFC 6455.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set without extension
    /// - `Error::FragmentedControlFrame` if control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if control frame payload > 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Write the frame to a buffer, masking the payload with `mask` if given.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` if the buffer is too small.
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        let payload_len = self.payload.len();
        let total_size = self.wire_size(mask.is_some());

        if buf.len() < total_size {
            return Err(Error::ProtocolViolation(format!(
                "Buffer too small: need {} bytes, have {}",
                total_size,
                buf.len()
            )));
        }

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf[0] = byte0;

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        let mut offset = 2;
        if payload_len <= 125 {
            buf[1] = mask_bit | payload_len as u8;
        } else if payload_len <= 65535 {
            buf[1] = mask_bit | 126;
            buf[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
            offset += 2;
        } else {
            buf[1] = mask_bit | 127;
            buf[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
            offset += 8;
        }

        if let Some(key) = mask {
            buf[offset..offset + 4].copy_from_slice(&key);
            offset += 4;
        }

        let body = &mut buf[offset..offset + payload_len];
        body.copy_from_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask(body, key);
        }

        Ok(total_size)
    }

    /// Serialize the frame into a new buffer.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_size(mask.is_some())];
        // The buffer is sized by wire_size, so write cannot run out of room.
        let _ = self.write(&mut buf, mask);
        buf
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}

/// Encode one frame from a caller-supplied opcode name.
///
/// The opcode name is checked before anything is produced. When `masked`
/// is set a fresh random key is drawn for this frame.
///
/// # Errors
///
/// Returns `Error::BadOpcode` if `opcode` is not one of `continuation`,
/// `text`, `binary`, `close`, `ping` or `pong`.
pub fn encode_frame(payload: &[u8], opcode: &str, fin: bool, masked: bool) -> Result<Vec<u8>> {
    let opcode: OpCode = opcode.parse()?;
    let frame = Frame::new(fin, opcode, payload.to_vec());
    let mask = masked.then(generate_mask);
    Ok(frame.encode(mask))
}
