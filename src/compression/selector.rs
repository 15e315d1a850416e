//! Try every candidate, keep the smallest.

use super::{compress_with, CompressionTag};
use crate::error::CompressionTrialError;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Output of [`CompressionSelector::auto_compress`].
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub tag: CompressionTag,
    /// compressed / original; 1.0 when stored uncompressed.
    pub ratio: f64,
}

impl Compressed {
    fn stored(src: &[u8]) -> Self {
        Self {
            bytes: src.to_vec(),
            tag: CompressionTag::None,
            ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressionSelector {
    candidates: Vec<CompressionTag>,
    level_override: Option<i32>,
}

impl Default for CompressionSelector {
    fn default() -> Self {
        Self {
            candidates: CompressionTag::CANDIDATES.to_vec(),
            level_override: None,
        }
    }
}

impl CompressionSelector {
    pub fn new(candidates: Vec<CompressionTag>) -> Self {
        Self {
            candidates,
            level_override: None,
        }
    }

    /// Fixed level for the zstd and zlib candidates. LZ4 keeps its own scale.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level_override = Some(level);
        self
    }

    pub fn candidates(&self) -> &[CompressionTag] {
        &self.candidates
    }

    fn level_for(&self, tag: CompressionTag) -> i32 {
        match (tag, self.level_override) {
            (CompressionTag::Zstd | CompressionTag::Zlib, Some(level)) => level,
            _ => tag.default_level(),
        }
    }

    fn trial(&self, tag: CompressionTag, src: &[u8]) -> Result<Vec<u8>, CompressionTrialError> {
        compress_with(tag, src, self.level_for(tag))
            .map_err(|source| CompressionTrialError { tag, source })
    }

    /// Compress `src` with every candidate and keep the smallest output.
    ///
    /// A failing candidate is logged and skipped; if none succeeds the blob is stored
    /// with tag `none` and ratio 1.0.
    pub fn auto_compress(&self, src: &[u8]) -> Compressed {
        if src.is_empty() {
            return Compressed::stored(src);
        }

        #[cfg(feature = "parallel")]
        let trials: Vec<_> = self
            .candidates
            .par_iter()
            .map(|&tag| (tag, self.trial(tag, src)))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let trials: Vec<_> = self
            .candidates
            .iter()
            .map(|&tag| (tag, self.trial(tag, src)))
            .collect();

        pick_smallest(src, trials)
    }
}

/// Selection step of [`CompressionSelector::auto_compress`], separated from running
/// the codecs. Trials are considered in order; the first of equally small outputs wins.
pub fn pick_smallest<I>(src: &[u8], trials: I) -> Compressed
where
    I: IntoIterator<Item = (CompressionTag, Result<Vec<u8>, CompressionTrialError>)>,
{
    let mut best: Option<(CompressionTag, Vec<u8>)> = None;

    for (tag, outcome) in trials {
        match outcome {
            Ok(bytes) => {
                debug!(algorithm = %tag, size = bytes.len(), original = src.len(), "compression trial");
                let smaller = best
                    .as_ref()
                    .map_or(true, |(_, current)| bytes.len() < current.len());
                if smaller {
                    best = Some((tag, bytes));
                }
            }
            Err(err) => warn!(error = %err, "skipping compression candidate"),
        }
    }

    match best {
        Some((tag, bytes)) if !src.is_empty() => {
            let ratio = bytes.len() as f64 / src.len() as f64;
            Compressed { bytes, tag, ratio }
        }
        _ => Compressed::stored(src),
    }
}
