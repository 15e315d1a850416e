//! Fixed 64-byte container header.

use crate::error::FormatError;
use bytes::{Buf, BufMut, BytesMut};

/// `NSM` followed by the layout generation byte.
pub const MAGIC: [u8; 4] = *b"NSM\x01";
/// Highest format version this crate reads and the one it writes.
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 64;

/// On-disk layout (little-endian):
/// - magic (4 bytes)
/// - version (u32)
/// - flags (u32, reserved, zero)
/// - metadata_size (u64)
/// - index_size (u64)
/// - payload_size (u64)
/// - reserved (u64, zero)
/// - 20 bytes of zero padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u32,
    pub flags: u32,
    pub metadata_size: u64,
    pub index_size: u64,
    pub payload_size: u64,
}

impl ContainerHeader {
    pub fn new(metadata_size: u64, index_size: u64, payload_size: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags: 0,
            metadata_size,
            index_size,
            payload_size,
        }
    }

    /// Total file length this header declares.
    pub fn declared_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.metadata_size + self.index_size + self.payload_size
    }

    /// Byte offset of the payload block from the start of the file.
    pub fn payload_offset(&self) -> u64 {
        HEADER_SIZE as u64 + self.metadata_size + self.index_size
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(&MAGIC);
        buf.put_u32_le(self.version);
        buf.put_u32_le(self.flags);
        buf.put_u64_le(self.metadata_size);
        buf.put_u64_le(self.index_size);
        buf.put_u64_le(self.payload_size);
        buf.put_u64_le(0);
        buf.put_bytes(0, HEADER_SIZE - buf.len());

        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Parse and validate the first [`HEADER_SIZE`] bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self, FormatError> {
        if src.len() < HEADER_SIZE {
            return Err(FormatError::TooShort {
                found: src.len(),
                needed: HEADER_SIZE,
            });
        }

        let mut buf = &src[..HEADER_SIZE];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }

        let version = buf.get_u32_le();
        if version > FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let flags = buf.get_u32_le();
        if flags != 0 {
            return Err(FormatError::ReservedNotZero { field: "flags" });
        }

        let metadata_size = buf.get_u64_le();
        let index_size = buf.get_u64_le();
        let payload_size = buf.get_u64_le();
        if buf.get_u64_le() != 0 {
            return Err(FormatError::ReservedNotZero { field: "reserved" });
        }

        Ok(Self {
            version,
            flags,
            metadata_size,
            index_size,
            payload_size,
        })
    }
}
