use crate::error::{FaultKind, NetError, NetResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

/// Bytes occupied by the message header.
pub const HEADER_SIZE: usize = 4;
/// Smallest legal message: a bare header.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE;
/// Largest message the engine will frame.
pub const MAX_PACKET_SIZE: usize = 65536;

/// The fixed message header every packet starts with. Packed little-endian on
/// the wire: `u16 size` (total length including the header) followed by
/// `u16 kind`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    pub size: u16,
    pub kind: u16,
}

impl Header {
    #[inline]
    pub fn new(size: u16, kind: u16) -> Header {
        Header { size, kind }
    }

    /// Decodes a header from an exact-size buffer, as peeked off a ring.
    #[inline]
    pub fn decode_array(raw: &[u8; HEADER_SIZE]) -> Header {
        Header {
            size: u16::from_le_bytes([raw[0], raw[1]]),
            kind: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    /// Decodes a header from the first `HEADER_SIZE` bytes of `raw`.
    pub fn decode(raw: &[u8]) -> NetResult<Header> {
        if raw.len() < HEADER_SIZE {
            return Err(NetError::Wait);
        }

        let mut cursor = Cursor::new(raw);
        let size = cursor.read_u16::<LittleEndian>()?;
        let kind = cursor.read_u16::<LittleEndian>()?;

        Ok(Header { size, kind })
    }

    /// Appends the encoded header to `out`.
    pub fn encode<W: Write>(&self, out: &mut W) -> NetResult<()> {
        out.write_u16::<LittleEndian>(self.size)?;
        out.write_u16::<LittleEndian>(self.kind)?;
        Ok(())
    }

    /// Validates the size bounds. A violation is fatal for the session that
    /// produced the header.
    #[inline]
    pub fn validate_size(&self) -> NetResult<()> {
        let size = self.size as usize;

        if size < MIN_PACKET_SIZE {
            return Err(NetError::Fatal(FaultKind::UndersizePacket));
        }
        if size > MAX_PACKET_SIZE {
            return Err(NetError::Fatal(FaultKind::OversizePacket));
        }

        Ok(())
    }
}
