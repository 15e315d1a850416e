//! Per-algorithm encode/decode, reached only through the dispatch table.

use super::CompressionTag;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::io::{self, Read, Write};

type EncodeFn = fn(&[u8], i32) -> io::Result<Vec<u8>>;
type DecodeFn = fn(&[u8]) -> io::Result<Vec<u8>>;

/// Codec entry for one tag.
pub(crate) struct CodecEntry {
    pub encode: EncodeFn,
    pub decode: DecodeFn,
    /// Level used when the caller does not override it.
    pub default_level: i32,
}

// ------------------------------------------------------------------
// 1. Dispatch table, indexed by `CompressionTag::code()`
// ------------------------------------------------------------------
static TABLE: [CodecEntry; 4] = [
    CodecEntry { encode: store, decode: unstore, default_level: 0 },
    CodecEntry { encode: zstd_encode, decode: zstd_decode, default_level: 6 },
    CodecEntry { encode: lz4_encode, decode: lz4_decode, default_level: 4 },
    CodecEntry { encode: zlib_encode, decode: zlib_decode, default_level: 6 },
];

#[inline(always)]
pub(crate) fn entry(tag: CompressionTag) -> &'static CodecEntry {
    &TABLE[tag.code() as usize]
}

// ------------------------------------------------------------------
// 2. None
// ------------------------------------------------------------------
fn store(src: &[u8], _level: i32) -> io::Result<Vec<u8>> {
    Ok(src.to_vec())
}

fn unstore(src: &[u8]) -> io::Result<Vec<u8>> {
    Ok(src.to_vec())
}

// ------------------------------------------------------------------
// 3. Zstd
// ------------------------------------------------------------------
fn zstd_encode(src: &[u8], level: i32) -> io::Result<Vec<u8>> {
    let mut compressor = zstd::bulk::Compressor::new(level)?;
    compressor.compress(src)
}

fn zstd_decode(src: &[u8]) -> io::Result<Vec<u8>> {
    zstd::stream::decode_all(src)
}

// ------------------------------------------------------------------
// 4. LZ4 (frame format)
// ------------------------------------------------------------------
fn lz4_encode(src: &[u8], level: i32) -> io::Result<Vec<u8>> {
    let mut encoder = lz4::EncoderBuilder::new()
        .level(level.clamp(0, 16) as u32)
        .build(Vec::with_capacity(src.len() / 2))?;
    encoder.write_all(src)?;
    let (out, result) = encoder.finish();
    result.map(|_| out)
}

/// LZ4 frame magic number, little-endian.
const LZ4_MAGIC: [u8; 4] = [0x04, 0x22, 0x4D, 0x18];

fn lz4_decode(src: &[u8]) -> io::Result<Vec<u8>> {
    if !src.starts_with(&LZ4_MAGIC) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing lz4 frame magic"));
    }
    let mut decoder = lz4::Decoder::new(src)?;
    let mut out = Vec::with_capacity(src.len() * 3);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

// ------------------------------------------------------------------
// 5. Zlib
// ------------------------------------------------------------------
fn zlib_encode(src: &[u8], level: i32) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(src.len() / 2),
        Compression::new(level.clamp(0, 9) as u32),
    );
    encoder.write_all(src)?;
    encoder.finish()
}

fn zlib_decode(src: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(src);
    let mut out = Vec::with_capacity(src.len() * 3);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
