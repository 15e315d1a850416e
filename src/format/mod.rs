//! Container envelope: header, metadata, index, payload.
//!
//! Blocks follow the header back to back in that order. Metadata and index are JSON;
//! the payload is opaque to this module.

mod blocks;
mod header;

#[cfg(test)]
mod tests;

pub use blocks::{ContainerIndex, ContentType, FrameEntry, Metadata};
pub use header::{ContainerHeader, FORMAT_VERSION, HEADER_SIZE, MAGIC};

use crate::error::FormatError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Raw blocks of a container, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawContainer {
    pub header: ContainerHeader,
    pub metadata: Vec<u8>,
    pub index: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Blocks borrowed from an in-memory (usually memory-mapped) container.
#[derive(Debug, Clone, Copy)]
pub struct BlockView<'a> {
    pub header: ContainerHeader,
    pub metadata: &'a [u8],
    pub index: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> BlockView<'a> {
    pub fn metadata(&self) -> Result<Metadata, FormatError> {
        serde_json::from_slice(self.metadata).map_err(FormatError::Metadata)
    }

    pub fn index(&self) -> Result<ContainerIndex, FormatError> {
        serde_json::from_slice(self.index).map_err(FormatError::Index)
    }
}

/// A parsed container.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub header: ContainerHeader,
    pub metadata: Metadata,
    pub index: ContainerIndex,
    pub payload: Vec<u8>,
}

// ------------------------------------------------------------------
// 1. Block level
// ------------------------------------------------------------------

/// Write header and the three blocks to `writer`.
pub fn write_blocks<W: Write>(
    writer: &mut W,
    metadata: &[u8],
    index: &[u8],
    payload: &[u8],
) -> Result<ContainerHeader, FormatError> {
    let header = ContainerHeader::new(
        metadata.len() as u64,
        index.len() as u64,
        payload.len() as u64,
    );
    writer.write_all(&header.encode())?;
    writer.write_all(metadata)?;
    writer.write_all(index)?;
    writer.write_all(payload)?;
    Ok(header)
}

fn read_block<R: Read>(reader: &mut R, block: &'static str, size: u64) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    reader.by_ref().take(size).read_to_end(&mut buf)?;
    if (buf.len() as u64) < size {
        return Err(FormatError::Truncated {
            block,
            expected: size,
            found: buf.len() as u64,
        });
    }
    Ok(buf)
}

/// Read the header and exactly the declared number of bytes for each block.
pub fn read_blocks<R: Read>(reader: &mut R) -> Result<RawContainer, FormatError> {
    let mut head = Vec::with_capacity(HEADER_SIZE);
    reader.by_ref().take(HEADER_SIZE as u64).read_to_end(&mut head)?;
    let header = ContainerHeader::decode(&head)?;

    let metadata = read_block(reader, "metadata", header.metadata_size)?;
    let index = read_block(reader, "index", header.index_size)?;
    let payload = read_block(reader, "payload", header.payload_size)?;

    Ok(RawContainer {
        header,
        metadata,
        index,
        payload,
    })
}

fn slice_block<'a>(
    src: &'a [u8],
    cursor: &mut usize,
    block: &'static str,
    size: u64,
) -> Result<&'a [u8], FormatError> {
    let available = (src.len() - *cursor) as u64;
    if available < size {
        return Err(FormatError::Truncated {
            block,
            expected: size,
            found: available,
        });
    }
    let start = *cursor;
    *cursor += size as usize;
    Ok(&src[start..*cursor])
}

/// Borrow the blocks out of a complete container image.
pub fn parse_blocks(src: &[u8]) -> Result<BlockView<'_>, FormatError> {
    let header = ContainerHeader::decode(src)?;
    let mut cursor = HEADER_SIZE;

    let metadata = slice_block(src, &mut cursor, "metadata", header.metadata_size)?;
    let index = slice_block(src, &mut cursor, "index", header.index_size)?;
    let payload = slice_block(src, &mut cursor, "payload", header.payload_size)?;

    Ok(BlockView {
        header,
        metadata,
        index,
        payload,
    })
}

/// Compare the payload against the checksum recorded in the index, if any.
pub fn verify_payload(index: &ContainerIndex, payload: &[u8]) -> Result<(), FormatError> {
    if let Some(expected) = index.payload_crc32 {
        let found = crc32fast::hash(payload);
        if found != expected {
            return Err(FormatError::ChecksumMismatch { expected, found });
        }
    }
    Ok(())
}

// ------------------------------------------------------------------
// 2. File level
// ------------------------------------------------------------------

/// Serialize metadata and index and write the container to `path`.
///
/// Bytes are staged in a temporary file next to `path` and moved into place only
/// once everything has been flushed, so a failure never leaves a partial container.
pub fn write(
    path: impl AsRef<Path>,
    metadata: &Metadata,
    index: &ContainerIndex,
    payload: &[u8],
) -> Result<ContainerHeader, FormatError> {
    let path = path.as_ref();
    let metadata_bytes = serde_json::to_vec(metadata).map_err(FormatError::Metadata)?;
    let index_bytes = serde_json::to_vec(index).map_err(FormatError::Index)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(staged);
    let header = write_blocks(&mut writer, &metadata_bytes, &index_bytes, payload)?;
    writer.flush()?;

    let staged = writer.into_inner().map_err(|err| err.into_error())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;

    debug!(
        path = %path.display(),
        size = header.declared_len(),
        "container written"
    );
    Ok(header)
}

/// Read and validate a container from `path`.
pub fn read(path: impl AsRef<Path>) -> Result<Container, FormatError> {
    let mut reader = BufReader::new(File::open(path)?);
    let raw = read_blocks(&mut reader)?;

    let metadata: Metadata = serde_json::from_slice(&raw.metadata).map_err(FormatError::Metadata)?;
    let index: ContainerIndex = serde_json::from_slice(&raw.index).map_err(FormatError::Index)?;
    verify_payload(&index, &raw.payload)?;

    Ok(Container {
        header: raw.header,
        metadata,
        index,
        payload: raw.payload,
    })
}

/// `true` when `path` holds a readable container.
pub fn validate(path: impl AsRef<Path>) -> bool {
    match read(path.as_ref()) {
        Ok(_) => true,
        Err(err) => {
            debug!(path = %path.as_ref().display(), error = %err, "container rejected");
            false
        }
    }
}
