//! Turns a set of texts into a sealed container file.

use crate::cache::UnitId;
use crate::chunk::{ChunkId, ChunkStore};
use crate::compression::{CompressionSelector, CompressionTag};
use crate::config::NsmConfig;
use crate::embedding::{EmbeddingIndex, EmbeddingProvider, TfIdfModel};
use crate::error::{NsmError, Result};
use crate::format::{self, ContainerIndex, ContentType, FrameEntry, Metadata, FORMAT_VERSION};
use crate::manifest::{FrameBody, Manifest};
use crate::quota::QuotaGate;
use crate::retriever::side_index;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLayout {
    /// Chunk text is read straight from the manifest.
    Inline,
    /// Chunk text is also grouped into independently compressed frames.
    Frames { chunks_per_frame: usize },
}

impl StorageLayout {
    pub fn content_type(&self) -> ContentType {
        match self {
            StorageLayout::Inline => ContentType::Inline,
            StorageLayout::Frames { .. } => ContentType::Frames,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub path: PathBuf,
    pub container_id: Uuid,
    pub chunks: usize,
    pub frames: usize,
    /// Bytes of chunk text submitted to the quota gate.
    pub corpus_bytes: u64,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub compression: CompressionTag,
    pub ratio: f64,
    pub side_index: Option<PathBuf>,
}

pub struct ContainerBuilder {
    store: ChunkStore,
    selector: CompressionSelector,
    layout: StorageLayout,
    provider: Box<dyn EmbeddingProvider>,
    license: Option<String>,
    extra: BTreeMap<String, Value>,
    side_index: bool,
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("chunks", &self.store.len())
            .field("layout", &self.layout)
            .field("model", &self.provider.model_id())
            .finish()
    }
}

impl ContainerBuilder {
    pub fn new(config: &NsmConfig) -> Result<Self> {
        let layout = match config.build.storage {
            ContentType::Inline => StorageLayout::Inline,
            ContentType::Frames => StorageLayout::Frames {
                chunks_per_frame: config.build.chunks_per_frame.max(1),
            },
        };
        Ok(Self {
            store: ChunkStore::new(config.chunking)?,
            selector: config.compression.selector(),
            layout,
            provider: Box::new(TfIdfModel::new()),
            license: None,
            extra: BTreeMap::new(),
            side_index: config.build.side_index,
        })
    }

    pub fn with_layout(mut self, layout: StorageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_provider(mut self, provider: Box<dyn EmbeddingProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Record a short hash of `key` in the metadata. The key itself is never stored.
    pub fn with_license(mut self, key: &str) -> Self {
        self.license = Some(license_hash(key));
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_side_index(mut self, enabled: bool) -> Self {
        self.side_index = enabled;
        self
    }

    pub fn add_text(&mut self, text: &str, source: &str) -> Result<Vec<ChunkId>> {
        Ok(self.store.add_text(text, source)?)
    }

    pub fn add_chunks<I, S>(&mut self, fragments: I, source: &str) -> Vec<ChunkId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.store.add_chunks(fragments, source)
    }

    /// Chunk a UTF-8 file, labelled with its path.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<ChunkId>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8(bytes).map_err(|_| {
            NsmError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8", path.display()),
            ))
        })?;
        self.add_text(&text, &path.display().to_string())
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Embed, compress and write everything added so far to `path`.
    ///
    /// `quota` is asked exactly once, before anything is serialized; a refusal leaves
    /// the filesystem untouched.
    pub fn build(self, path: impl AsRef<Path>, quota: &dyn QuotaGate) -> Result<BuildReport> {
        let path = path.as_ref();
        if self.store.is_empty() {
            return Err(NsmError::EmptyCorpus);
        }
        if self.store.len() > UnitId::MAX as usize {
            return Err(NsmError::Serialization(format!(
                "{} chunks exceed the addressable unit range",
                self.store.len()
            )));
        }

        let corpus_bytes = self.store.total_bytes() as u64;
        if !quota.authorize(corpus_bytes) {
            return Err(NsmError::QuotaDenied {
                requested: corpus_bytes,
            });
        }

        let ContainerBuilder {
            store,
            selector,
            layout,
            provider,
            license,
            extra,
            side_index: write_side_index,
        } = self;

        let embeddings = {
            let texts = store.texts();
            EmbeddingIndex::build(provider, &texts)
        };
        let model = embeddings.provider().stored();
        let embedding_dim = model.dimension();
        let manifest = Manifest {
            chunks: store.into_chunks(),
            embeddings: embeddings.into_vectors(),
            model,
        };

        let manifest_bytes = manifest.encode()?;
        let packed = selector.auto_compress(&manifest_bytes);
        let manifest_len = packed.bytes.len() as u64;
        let mut payload = packed.bytes;

        let frames = match layout {
            StorageLayout::Inline => Vec::new(),
            StorageLayout::Frames { chunks_per_frame } => {
                append_frames(&mut payload, &manifest, chunks_per_frame.max(1), &selector)?
            }
        };

        let payload_crc32 = crc32fast::hash(&payload);
        let index = ContainerIndex {
            content_type: layout.content_type(),
            compression: packed.tag.name().to_string(),
            embedding_dim,
            manifest_len,
            payload_crc32: Some(payload_crc32),
            frames,
        };
        let metadata = Metadata {
            format_version: FORMAT_VERSION,
            container_id: Uuid::new_v4(),
            created_at: Utc::now(),
            compression: packed.tag.name().to_string(),
            compression_ratio: packed.ratio,
            embedding_model: manifest.model.model_id().to_string(),
            license_hash: license,
            chunk_count: manifest.chunks.len(),
            uncompressed_size: manifest_bytes.len() as u64,
            compressed_size: payload.len() as u64,
            storage: layout.content_type(),
            extra,
        };

        format::write(path, &metadata, &index, &payload)?;

        let side_index = if write_side_index {
            match side_index::write(path, &manifest, payload_crc32) {
                Ok(written) => Some(written),
                Err(err) => {
                    warn!(error = %err, "side index not written");
                    None
                }
            }
        } else {
            None
        };

        info!(
            path = %path.display(),
            chunks = metadata.chunk_count,
            frames = index.frames.len(),
            algorithm = %packed.tag,
            ratio = packed.ratio,
            "container built"
        );

        Ok(BuildReport {
            path: path.to_path_buf(),
            container_id: metadata.container_id,
            chunks: metadata.chunk_count,
            frames: index.frames.len(),
            corpus_bytes,
            uncompressed_size: metadata.uncompressed_size,
            compressed_size: metadata.compressed_size,
            compression: packed.tag,
            ratio: packed.ratio,
            side_index,
        })
    }
}

/// Compress chunk groups one frame at a time and append them after the manifest.
fn append_frames(
    payload: &mut Vec<u8>,
    manifest: &Manifest,
    chunks_per_frame: usize,
    selector: &CompressionSelector,
) -> Result<Vec<FrameEntry>> {
    manifest
        .chunks
        .chunks(chunks_per_frame)
        .enumerate()
        .map(|(unit, group)| {
            let unit = unit as UnitId;
            let body = FrameBody::new(unit, group).to_json()?;
            let packed = selector.auto_compress(&body);
            let entry = FrameEntry {
                unit,
                offset: payload.len() as u64,
                length: packed.bytes.len() as u64,
                compression: packed.tag.name().to_string(),
                crc32: crc32fast::hash(&packed.bytes),
                chunk_ids: group.iter().map(|chunk| chunk.id).collect(),
            };
            payload.extend_from_slice(&packed.bytes);
            Ok(entry)
        })
        .collect()
}

/// First 16 hex chars of the BLAKE3 hash of `key`.
pub fn license_hash(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex()[..16].to_string()
}
