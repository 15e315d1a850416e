//! Chunk data model and the append-only store filled during a build.

mod splitter;

#[cfg(test)]
mod tests;

pub use splitter::{split, ChunkingConfig, Window, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

use crate::error::ChunkingError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub type ChunkId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    /// Label of the document the chunk came from (usually a path).
    pub source: String,
    /// Position of the chunk within its source.
    pub sequence: u32,
    /// Char offset of the chunk within its source.
    pub offset: usize,
    pub byte_len: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStats {
    pub chunks: usize,
    pub sources: usize,
    pub total_bytes: usize,
    pub avg_chunk_bytes: f64,
}

/// Where the next chunk of a source goes.
#[derive(Debug, Clone, Copy, Default)]
struct SourceCursor {
    sequence: u32,
    /// Char offset just past everything added for the source so far.
    offset: usize,
}

/// Ordered collection of chunks. Ids are dense and equal to the position in the store.
///
/// Repeated calls for the same source continue its sequence numbers and offsets.
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    config: ChunkingConfig,
    chunks: Vec<Chunk>,
    cursors: HashMap<String, SourceCursor>,
}

impl ChunkStore {
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self {
            config,
            chunks: Vec::new(),
            cursors: HashMap::new(),
        })
    }

    /// Rebuild a store from chunks read back out of a container.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let mut cursors: HashMap<String, SourceCursor> = HashMap::new();
        for chunk in &chunks {
            let cursor = cursors.entry(chunk.source.clone()).or_default();
            cursor.sequence = cursor.sequence.max(chunk.sequence + 1);
            cursor.offset = cursor.offset.max(chunk.offset + chunk.text.chars().count());
        }
        Self {
            config: ChunkingConfig::default(),
            chunks,
            cursors,
        }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn cursor(&mut self, source: &str) -> &mut SourceCursor {
        self.cursors.entry(source.to_string()).or_default()
    }

    /// Append one chunk at `offset` chars into `source`.
    fn push(&mut self, text: &str, source: &str, offset: usize) -> ChunkId {
        let id = self.chunks.len() as ChunkId;
        let cursor = self.cursor(source);
        let sequence = cursor.sequence;
        cursor.sequence += 1;
        self.chunks.push(Chunk {
            id,
            text: text.to_string(),
            source: source.to_string(),
            sequence,
            offset,
            byte_len: text.len(),
        });
        id
    }

    /// Split `text` and append the windows. Returns the ids assigned.
    pub fn add_text(&mut self, text: &str, source: &str) -> Result<Vec<ChunkId>, ChunkingError> {
        let windows = split(text, &self.config)?;
        let base = self.cursor(source).offset;
        let ids: Vec<_> = windows
            .iter()
            .map(|window| self.push(window.text, source, base + window.offset))
            .collect();
        self.cursor(source).offset = base + text.chars().count();
        debug!(source, chunks = ids.len(), "text chunked");
        Ok(ids)
    }

    /// Append already split fragments verbatim, one chunk each.
    pub fn add_chunks<I, S>(&mut self, fragments: I, source: &str) -> Vec<ChunkId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = Vec::new();
        for fragment in fragments {
            let fragment = fragment.as_ref();
            let offset = self.cursor(source).offset;
            ids.push(self.push(fragment, source, offset));
            self.cursor(source).offset = offset + fragment.chars().count();
        }
        ids
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        usize::try_from(id).ok().and_then(|pos| self.chunks.get(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    pub fn as_slice(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.byte_len).sum()
    }

    pub fn stats(&self) -> ChunkStats {
        let total_bytes = self.total_bytes();
        let avg_chunk_bytes = if self.chunks.is_empty() {
            0.0
        } else {
            total_bytes as f64 / self.chunks.len() as f64
        };
        ChunkStats {
            chunks: self.chunks.len(),
            sources: self
                .chunks
                .iter()
                .map(|chunk| chunk.source.as_str())
                .collect::<HashSet<_>>()
                .len(),
            total_bytes,
            avg_chunk_bytes,
        }
    }
}
