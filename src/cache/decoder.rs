//! Turning a unit id back into text.

use super::UnitId;
use crate::chunk::Chunk;
use crate::compression::{decompress, CompressionTag};
use crate::error::DecodeUnitError;
use crate::format::FrameEntry;
use std::ops::Deref;
use std::sync::Arc;

/// Recovers the text of one storage unit. Called from decode workers.
pub trait UnitDecoder: Send + Sync {
    fn decode(&self, unit: UnitId) -> Result<String, DecodeUnitError>;
}

/// Inline storage: unit `n` is chunk `n` and its text is already in memory.
#[derive(Debug, Clone)]
pub struct InlineUnits {
    chunks: Arc<[Chunk]>,
}

impl InlineUnits {
    pub fn new(chunks: Arc<[Chunk]>) -> Self {
        Self { chunks }
    }
}

impl UnitDecoder for InlineUnits {
    fn decode(&self, unit: UnitId) -> Result<String, DecodeUnitError> {
        self.chunks
            .get(unit as usize)
            .map(|chunk| chunk.text.clone())
            .ok_or(DecodeUnitError::UnknownUnit(unit))
    }
}

/// Frame storage: each unit is an independently compressed frame inside the payload.
///
/// `B` is the whole container image, usually a memory map.
pub struct FrameUnits<B> {
    image: Arc<B>,
    payload_offset: usize,
    /// Sorted by unit.
    frames: Vec<FrameEntry>,
}

impl<B> FrameUnits<B>
where
    B: Deref<Target = [u8]> + Send + Sync,
{
    pub fn new(image: Arc<B>, payload_offset: usize, mut frames: Vec<FrameEntry>) -> Self {
        frames.sort_by_key(|frame| frame.unit);
        Self {
            image,
            payload_offset,
            frames,
        }
    }

    pub fn frame(&self, unit: UnitId) -> Option<&FrameEntry> {
        self.frames
            .binary_search_by_key(&unit, |frame| frame.unit)
            .ok()
            .map(|pos| &self.frames[pos])
    }

    fn bytes_of(&self, frame: &FrameEntry) -> Option<&[u8]> {
        let start = self.payload_offset.checked_add(usize::try_from(frame.offset).ok()?)?;
        let end = start.checked_add(usize::try_from(frame.length).ok()?)?;
        self.image.get(start..end)
    }
}

impl<B> UnitDecoder for FrameUnits<B>
where
    B: Deref<Target = [u8]> + Send + Sync,
{
    fn decode(&self, unit: UnitId) -> Result<String, DecodeUnitError> {
        let frame = self.frame(unit).ok_or(DecodeUnitError::UnknownUnit(unit))?;
        let bytes = self.bytes_of(frame).ok_or_else(|| DecodeUnitError::Failed {
            unit,
            reason: format!("frame range {}+{} is outside the payload", frame.offset, frame.length),
        })?;

        let found = crc32fast::hash(bytes);
        if found != frame.crc32 {
            return Err(DecodeUnitError::ChecksumMismatch {
                unit,
                expected: frame.crc32,
                found,
            });
        }

        let decompress_err = |reason: String| DecodeUnitError::Decompress { unit, reason };
        let tag = CompressionTag::from_name(&frame.compression).map_err(|e| decompress_err(e.to_string()))?;
        let raw = decompress(bytes, tag).map_err(|e| decompress_err(e.to_string()))?;

        String::from_utf8(raw).map_err(|_| DecodeUnitError::InvalidText(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::compress_with;

    fn chunk(id: u64, text: &str) -> Chunk {
        Chunk {
            id,
            text: text.into(),
            source: "t".into(),
            sequence: id as u32,
            offset: 0,
            byte_len: text.len(),
        }
    }

    /// A fake image: 8 bytes of prefix, then two zlib frames.
    fn image() -> (Arc<Vec<u8>>, Vec<FrameEntry>) {
        let mut image = vec![0xAA; 8];
        let mut frames = Vec::new();
        for (unit, text) in [(1u32, "first frame"), (0u32, "zeroth frame")] {
            let bytes = compress_with(CompressionTag::Zlib, text.as_bytes(), 6).unwrap();
            frames.push(FrameEntry {
                unit,
                offset: (image.len() - 8) as u64,
                length: bytes.len() as u64,
                compression: "zlib".into(),
                crc32: crc32fast::hash(&bytes),
                chunk_ids: vec![unit as u64],
            });
            image.extend_from_slice(&bytes);
        }
        (Arc::new(image), frames)
    }

    #[test]
    fn inline_units_are_chunks() {
        let units = InlineUnits::new(vec![chunk(0, "a"), chunk(1, "b")].into());
        assert_eq!(units.decode(1).unwrap(), "b");
        assert!(matches!(units.decode(2), Err(DecodeUnitError::UnknownUnit(2))));
    }

    #[test]
    fn frames_decode_from_their_offsets() {
        let (image, frames) = image();
        let units = FrameUnits::new(image, 8, frames);
        assert_eq!(units.decode(0).unwrap(), "zeroth frame");
        assert_eq!(units.decode(1).unwrap(), "first frame");
        assert!(matches!(units.decode(7), Err(DecodeUnitError::UnknownUnit(7))));
    }

    #[test]
    fn corrupted_frame_fails_its_checksum() {
        let (image, frames) = image();
        let mut bytes = (*image).clone();
        let target = frames.iter().find(|f| f.unit == 0).unwrap();
        bytes[8 + target.offset as usize] ^= 0xFF;

        let units = FrameUnits::new(Arc::new(bytes), 8, frames);
        assert!(matches!(units.decode(0), Err(DecodeUnitError::ChecksumMismatch { unit: 0, .. })));
        assert!(units.decode(1).is_ok());
    }

    #[test]
    fn bad_tag_and_bad_range_are_unit_errors() {
        let (image, mut frames) = image();
        frames[0].compression = "brotli".into();
        frames[1].length = 10_000;
        let units = FrameUnits::new(image, 8, frames);
        assert!(matches!(units.decode(1), Err(DecodeUnitError::Decompress { unit: 1, .. })));
        assert!(matches!(units.decode(0), Err(DecodeUnitError::Failed { unit: 0, .. })));
    }
}
