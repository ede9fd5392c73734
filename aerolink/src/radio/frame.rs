//! Radio frame wire codec.
//!
//! Frames are the atomic unit of transmission on the LoRa link:
//!
//! ```text
//! [sequence u32 BE][priority u8][kind u8][payload_len u16 BE][payload...][crc16 u16 BE]
//! ```
//!
//! The CRC-16 (reflected polynomial 0xA001, init 0xFFFF) covers the header
//! and payload. Encoding is deterministic, so `decode(encode(f)) == f` for
//! any well-formed frame. Decoding never keeps partial-frame state; stream
//! resynchronization after a corrupt prefix is the link's job.

use thiserror::Error;

/// Header bytes preceding the payload: sequence (4) + priority (1) +
/// kind (1) + payload length (2).
pub const HEADER_LEN: usize = 8;

/// Trailing checksum bytes.
pub const CHECKSUM_LEN: usize = 2;

/// Maximum payload per frame. A LoRa packet tops out around 230 bytes;
/// header and checksum take 10.
pub const MAX_PAYLOAD_LEN: usize = 220;

/// Message priority, highest first on the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Bulk data, logs.
    Low = 0,
    /// Regular telemetry and position updates.
    Normal = 1,
    /// Status changes, mode transitions.
    High = 2,
    /// Control and emergency traffic.
    Critical = 3,
}

impl Priority {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Low),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            3 => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Frame kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Application payload.
    Data = 0,
    /// Acknowledgement of a `Data` frame, matched by sequence number.
    Ack = 1,
    /// Keep-alive, sent when the link is idle. Never acknowledged.
    Ping = 2,
}

impl FrameKind {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Data),
            1 => Some(Self::Ack),
            2 => Some(Self::Ping),
            _ => None,
        }
    }
}

/// A decoded radio frame.
///
/// Sequence numbers are strictly increasing per sender and are what
/// acknowledgements match against. The checksum is computed on encode and
/// verified on decode; it is not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Per-sender monotonic sequence number.
    pub sequence: u32,
    /// Transmission priority.
    pub priority: Priority,
    /// Frame kind.
    pub kind: FrameKind,
    /// Application payload; empty for acks and pings.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a data frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLong`] if the payload exceeds
    /// [`MAX_PAYLOAD_LEN`].
    pub fn data(sequence: u32, priority: Priority, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        Ok(Self {
            sequence,
            priority,
            kind: FrameKind::Data,
            payload,
        })
    }

    /// Creates an ack for the given sequence number.
    pub fn ack(sequence: u32) -> Self {
        Self {
            sequence,
            priority: Priority::Critical,
            kind: FrameKind::Ack,
            payload: Vec::new(),
        }
    }

    /// Creates a keep-alive ping.
    pub fn ping(sequence: u32) -> Self {
        Self {
            sequence,
            priority: Priority::Low,
            kind: FrameKind::Ping,
            payload: Vec::new(),
        }
    }

    /// Total encoded length of this frame on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len() + CHECKSUM_LEN
    }
}

/// Errors constructing a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload too long: {0} bytes (max {MAX_PAYLOAD_LEN})")]
    PayloadTooLong(usize),
}

/// Errors decoding a byte buffer into a frame.
///
/// The caller drops the offending bytes and resynchronizes; a decode
/// failure never poisons the link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer does not yet contain a complete frame.
    #[error("truncated frame: have {have} bytes, need {needed}")]
    Truncated {
        /// Bytes available.
        have: usize,
        /// Bytes required for a complete frame.
        needed: usize,
    },

    /// Checksum over header + payload did not match.
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum carried on the wire.
        expected: u16,
        /// Checksum computed over the received bytes.
        actual: u16,
    },

    /// Priority byte is not a known value.
    #[error("invalid priority byte: {0:#04x}")]
    InvalidPriority(u8),

    /// Kind byte is not a known value.
    #[error("invalid kind byte: {0:#04x}")]
    InvalidKind(u8),

    /// Declared payload length exceeds [`MAX_PAYLOAD_LEN`]; the length
    /// field itself is presumed corrupt.
    #[error("declared payload length {0} exceeds max {MAX_PAYLOAD_LEN}")]
    PayloadTooLong(usize),
}

/// CRC-16 with reflected polynomial 0xA001, init 0xFFFF.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in bytes {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Encodes a frame to wire bytes.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frame.wire_len());
    buf.extend_from_slice(&frame.sequence.to_be_bytes());
    buf.push(frame.priority as u8);
    buf.push(frame.kind as u8);
    buf.extend_from_slice(&(frame.payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(&frame.payload);
    let crc = crc16(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// Decodes one frame from the start of `buf`.
///
/// Trailing bytes beyond the frame are ignored; use [`decoded_len`] to find
/// how many bytes the frame consumed.
pub fn decode(buf: &[u8]) -> Result<Frame, DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            have: buf.len(),
            needed: HEADER_LEN,
        });
    }

    let payload_len = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(DecodeError::PayloadTooLong(payload_len));
    }

    let total = HEADER_LEN + payload_len + CHECKSUM_LEN;
    if buf.len() < total {
        return Err(DecodeError::Truncated {
            have: buf.len(),
            needed: total,
        });
    }

    let expected = u16::from_be_bytes([buf[total - 2], buf[total - 1]]);
    let actual = crc16(&buf[..total - CHECKSUM_LEN]);
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    let priority =
        Priority::from_wire(buf[4]).ok_or(DecodeError::InvalidPriority(buf[4]))?;
    let kind = FrameKind::from_wire(buf[5]).ok_or(DecodeError::InvalidKind(buf[5]))?;

    Ok(Frame {
        sequence: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        priority,
        kind,
        payload: buf[HEADER_LEN..HEADER_LEN + payload_len].to_vec(),
    })
}

/// Wire length of the frame starting at `buf`, if the header is complete
/// and the declared payload length is plausible.
pub fn decoded_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let payload_len = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return None;
    }
    Some(HEADER_LEN + payload_len + CHECKSUM_LEN)
}
