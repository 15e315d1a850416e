//! Metadata and index blocks. Both are JSON objects on disk.

use crate::cache::UnitId;
use crate::chunk::ChunkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// How chunk text is recovered from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// The manifest carries all chunk text; a unit is a single chunk.
    Inline,
    /// Chunk text lives in separately compressed frames after the manifest.
    Frames,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Inline => "inline",
            ContentType::Frames => "frames",
        }
    }
}

/// Free-form description of a container, written once when the build finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub format_version: u32,
    pub container_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub compression: String,
    pub compression_ratio: f64,
    pub embedding_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_hash: Option<String>,
    pub chunk_count: usize,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub storage: ContentType,
    /// Caller-supplied keys, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One independently compressed frame of an indirect store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub unit: UnitId,
    /// Offset from the start of the payload block.
    pub offset: u64,
    pub length: u64,
    pub compression: String,
    pub crc32: u32,
    pub chunk_ids: Vec<ChunkId>,
}

/// Describes how to interpret the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerIndex {
    pub content_type: ContentType,
    /// Algorithm of the manifest section.
    pub compression: String,
    pub embedding_dim: usize,
    /// Length of the compressed manifest at the start of the payload.
    pub manifest_len: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_crc32: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameEntry>,
}

impl ContainerIndex {
    pub fn frame(&self, unit: UnitId) -> Option<&FrameEntry> {
        self.frames
            .binary_search_by_key(&unit, |frame| frame.unit)
            .ok()
            .map(|pos| &self.frames[pos])
    }
}
