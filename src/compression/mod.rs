//! Adaptive payload compression.
//!
//! A closed set of algorithms, dispatched by [`CompressionTag`]. The
//! [`CompressionSelector`] tries every configured candidate on a blob and keeps the
//! smallest output; [`decompress`] reverses it given the recorded tag.

mod codec;
mod selector;

pub use selector::{pick_smallest, Compressed, CompressionSelector};

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionTag {
    /// Stored as-is.
    None,
    Zstd,
    Lz4,
    Zlib,
}

impl CompressionTag {
    pub const ALL: [CompressionTag; 4] = [
        CompressionTag::None,
        CompressionTag::Zstd,
        CompressionTag::Lz4,
        CompressionTag::Zlib,
    ];

    /// Candidates tried by default, in tie-break order.
    pub const CANDIDATES: [CompressionTag; 3] =
        [CompressionTag::Zstd, CompressionTag::Lz4, CompressionTag::Zlib];

    #[inline(always)]
    pub fn code(self) -> u8 {
        match self {
            CompressionTag::None => 0,
            CompressionTag::Zstd => 1,
            CompressionTag::Lz4 => 2,
            CompressionTag::Zlib => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionTag::None => "none",
            CompressionTag::Zstd => "zstd",
            CompressionTag::Lz4 => "lz4",
            CompressionTag::Zlib => "zlib",
        }
    }

    /// Parses a tag name as recorded in a container. Unknown names are fatal: there is
    /// no way to guess which algorithm produced the bytes.
    pub fn from_name(name: &str) -> Result<Self, DecodeError> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name() == name)
            .ok_or_else(|| DecodeError::UnknownTag(name.to_string()))
    }

    /// Level used by the selector when no override is configured.
    pub fn default_level(self) -> i32 {
        codec::entry(self).default_level
    }
}

impl fmt::Display for CompressionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compress `src` with one specific algorithm.
pub fn compress_with(tag: CompressionTag, src: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    (codec::entry(tag).encode)(src, level)
}

/// Reverse [`compress_with`] / [`CompressionSelector::auto_compress`].
pub fn decompress(src: &[u8], tag: CompressionTag) -> Result<Vec<u8>, DecodeError> {
    (codec::entry(tag).decode)(src).map_err(|source| DecodeError::Corrupt { tag, source })
}

/// Same as [`decompress`], for a tag still in its on-disk textual form.
pub fn decompress_named(src: &[u8], name: &str) -> Result<Vec<u8>, DecodeError> {
    decompress(src, CompressionTag::from_name(name)?)
}
