//! Read side: open a container once, then answer queries against it.
//!
//! Ranking happens on the vectors held in memory. Text is fetched per storage unit
//! through the retriever's own [`FrameCache`], so the same code serves inline and
//! frame storage. A unit that cannot be decoded never fails a query: the chunk text
//! kept in the manifest is returned instead.

pub mod side_index;

use crate::cache::{CacheStats, FrameCache, FrameUnits, InlineUnits, Resolved, UnitDecoder, UnitId};
use crate::chunk::{Chunk, ChunkId};
use crate::compression;
use crate::config::RetrievalConfig;
use crate::embedding::{EmbeddingIndex, EmbeddingProvider};
use crate::error::{FormatError, NsmError, Result};
use crate::format::{self, ContainerIndex, ContentType, Metadata};
use crate::manifest::{FrameBody, Manifest};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of chunks resolved per batch by [`Retriever::extract_all`].
const EXTRACT_BATCH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: ChunkId,
    pub score: f32,
    pub rank: usize,
    pub unit: Option<UnitId>,
    pub source: String,
    pub text: String,
    /// The unit failed to decode and `text` comes from the manifest.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverStats {
    pub path: PathBuf,
    pub chunks: usize,
    pub units: usize,
    pub storage: ContentType,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub cache: CacheStats,
}

pub struct Retriever {
    path: PathBuf,
    metadata: Metadata,
    index: ContainerIndex,
    chunks: Arc<[Chunk]>,
    /// Storage unit of each chunk, by chunk id.
    units: Vec<Option<UnitId>>,
    embeddings: EmbeddingIndex,
    cache: FrameCache,
    config: RetrievalConfig,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("path", &self.path)
            .field("chunks", &self.chunks.len())
            .field("storage", &self.index.content_type)
            .field("cache", &self.cache)
            .finish()
    }
}

// ------------------------------------------------------------------
// 1. Opening
// ------------------------------------------------------------------

impl Retriever {
    /// Open a container whose embedding model can be rebuilt from its own contents.
    pub fn open(path: impl AsRef<Path>, config: &RetrievalConfig) -> Result<Self> {
        Self::open_inner(path.as_ref(), config, None)
    }

    /// Open a container built with an external provider. The provider must report the
    /// same model id and dimension as the one recorded at build time.
    pub fn open_with_provider(
        path: impl AsRef<Path>,
        config: &RetrievalConfig,
        provider: Box<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        Self::open_inner(path.as_ref(), config, Some(provider))
    }

    fn open_inner(
        path: &Path,
        config: &RetrievalConfig,
        provider: Option<Box<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: containers are immutable once written; the map is read-only.
        let image = Arc::new(unsafe { Mmap::map(&file)? });

        let view = format::parse_blocks(&image)?;
        let metadata = view.metadata()?;
        let index = view.index()?;
        format::verify_payload(&index, view.payload)?;
        let payload_offset = view.header.payload_offset() as usize;

        let cached = match index.payload_crc32 {
            Some(crc) if config.use_side_index => side_index::load(path, crc),
            _ => None,
        };
        let manifest = match cached {
            Some(manifest) => {
                debug!(path = %path.display(), "manifest taken from side index");
                manifest
            }
            None => {
                let manifest_len = index.manifest_len as usize;
                let packed = view.payload.get(..manifest_len).ok_or(FormatError::Truncated {
                    block: "manifest",
                    expected: index.manifest_len,
                    found: view.payload.len() as u64,
                })?;
                let raw = compression::decompress_named(packed, &index.compression)?;
                Manifest::decode(&raw)?
            }
        };

        let provider = match provider {
            Some(provider) => {
                let stored = &manifest.model;
                if provider.model_id() != stored.model_id() || provider.dimension() != stored.dimension() {
                    return Err(NsmError::ModelMismatch {
                        stored: format!("{} ({} dims)", stored.model_id(), stored.dimension()),
                        provided: format!("{} ({} dims)", provider.model_id(), provider.dimension()),
                    });
                }
                provider
            }
            None => manifest.model.restore().ok_or_else(|| NsmError::ModelMismatch {
                stored: manifest.model.model_id().to_string(),
                provided: "none".to_string(),
            })?,
        };

        let Manifest {
            chunks, embeddings, ..
        } = manifest;
        let chunks: Arc<[Chunk]> = chunks.into();
        let embeddings = EmbeddingIndex::from_parts(provider, embeddings).with_metric(config.metric);

        let (decoder, units): (Arc<dyn UnitDecoder>, Vec<Option<UnitId>>) = match index.content_type {
            ContentType::Inline => {
                let decoder: Arc<dyn UnitDecoder> = Arc::new(InlineUnits::new(Arc::clone(&chunks)));
                (decoder, (0..chunks.len()).map(|id| Some(id as UnitId)).collect())
            }
            ContentType::Frames => {
                let mut units = vec![None; chunks.len()];
                for frame in &index.frames {
                    for &id in &frame.chunk_ids {
                        if let Some(slot) = units.get_mut(id as usize) {
                            *slot = Some(frame.unit);
                        }
                    }
                }
                let decoder: Arc<dyn UnitDecoder> =
                    Arc::new(FrameUnits::new(Arc::clone(&image), payload_offset, index.frames.clone()));
                (decoder, units)
            }
        };
        let cache = FrameCache::new(decoder, config.cache_size, config.workers)?;

        info!(
            path = %path.display(),
            chunks = chunks.len(),
            storage = index.content_type.as_str(),
            "container opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            index,
            chunks,
            units,
            embeddings,
            cache,
            config: config.clone(),
        })
    }
}

// ------------------------------------------------------------------
// 2. Queries
// ------------------------------------------------------------------

impl Retriever {
    /// Text of the `top_k` best chunks for `query`, best first.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<String> {
        self.search_with_scores(query, top_k, self.config.threshold)
            .into_iter()
            .map(|hit| hit.text)
            .collect()
    }

    pub fn search_with_scores(&self, query: &str, top_k: usize, threshold: f32) -> Vec<RetrievedChunk> {
        let started = Instant::now();
        let hits = self.embeddings.search(query, top_k, threshold);
        if hits.is_empty() {
            return Vec::new();
        }

        let ids: Vec<ChunkId> = hits.iter().map(|hit| hit.id).collect();
        let texts = self.texts_for(&ids);

        let results: Vec<RetrievedChunk> = hits
            .into_iter()
            .zip(texts)
            .map(|(hit, (text, fallback))| RetrievedChunk {
                id: hit.id,
                score: hit.score,
                rank: hit.rank,
                unit: self.unit_of(hit.id),
                source: self.chunks[hit.id as usize].source.clone(),
                text,
                fallback,
            })
            .collect();

        debug!(
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        results
    }

    pub fn get_chunk_by_id(&self, id: ChunkId) -> Option<String> {
        self.chunk(id)?;
        self.texts_for(&[id]).pop().map(|(text, _)| text)
    }

    /// Chunks `id - radius ..= id + radius` that exist, in id order.
    pub fn context_window(&self, id: ChunkId, radius: u64) -> Vec<String> {
        let first = id.saturating_sub(radius);
        let last = id.saturating_add(radius).min(self.chunks.len() as u64);
        let ids: Vec<ChunkId> = (first..=last).filter(|&id| self.chunk(id).is_some()).collect();
        self.texts_for(&ids).into_iter().map(|(text, _)| text).collect()
    }

    fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        usize::try_from(id).ok().and_then(|pos| self.chunks.get(pos))
    }

    fn unit_of(&self, id: ChunkId) -> Option<UnitId> {
        usize::try_from(id).ok().and_then(|pos| self.units.get(pos).copied().flatten())
    }

    /// Text for each id plus whether the manifest copy had to be used. Ids must exist.
    fn texts_for(&self, ids: &[ChunkId]) -> Vec<(String, bool)> {
        let units: Vec<UnitId> = ids.iter().filter_map(|&id| self.unit_of(id)).collect();
        let deadline = self.config.decode_timeout().map(|timeout| Instant::now() + timeout);
        let resolved = self.cache.resolve(&units, deadline);
        let frames = self.parse_frames(&resolved);

        ids.iter()
            .map(|&id| {
                let raw = || (self.chunks[id as usize].text.clone(), true);
                let Some(unit) = self.unit_of(id) else {
                    return raw();
                };
                let Some(decoded) = resolved.texts.get(&unit) else {
                    return raw();
                };
                match self.index.content_type {
                    ContentType::Inline => (decoded.to_string(), false),
                    ContentType::Frames => match frames.get(&unit).and_then(|body| body.text_of(id)) {
                        Some(text) => (text.to_string(), false),
                        None => raw(),
                    },
                }
            })
            .collect()
    }

    fn parse_frames(&self, resolved: &Resolved) -> HashMap<UnitId, FrameBody> {
        if self.index.content_type != ContentType::Frames {
            return HashMap::new();
        }
        resolved
            .texts
            .iter()
            .filter_map(|(&unit, text)| match FrameBody::parse(text) {
                Ok(body) => Some((unit, body)),
                Err(err) => {
                    warn!(unit, error = %err, "frame body unreadable, using manifest text");
                    None
                }
            })
            .collect()
    }
}

// ------------------------------------------------------------------
// 3. Cache control, introspection, extraction
// ------------------------------------------------------------------

impl Retriever {
    /// Warm the cache for `units` without waiting.
    pub fn prefetch(&self, units: &[UnitId]) {
        self.cache.prefetch(units);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    pub fn stats(&self) -> RetrieverStats {
        RetrieverStats {
            path: self.path.clone(),
            chunks: self.chunks.len(),
            units: match self.index.content_type {
                ContentType::Inline => self.chunks.len(),
                ContentType::Frames => self.index.frames.len(),
            },
            storage: self.index.content_type,
            embedding_model: self.embeddings.provider().model_id().to_string(),
            embedding_dim: self.embeddings.provider().dimension(),
            cache: self.cache.stats(),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn index(&self) -> &ContainerIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every chunk to `dir` as `chunk_<id>.txt`.
    ///
    /// Files go to a hidden sibling directory first, which is renamed to `dir` only
    /// once all of them are written. `dir` must not exist or be empty.
    pub fn extract_all(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if dir.exists() && fs::read_dir(dir)?.next().is_some() {
            return Err(NsmError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} is not empty", dir.display()),
            )));
        }
        let parent = match dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new().prefix(".nsm-extract").tempdir_in(parent)?;

        let mut names = Vec::with_capacity(self.chunks.len());
        let ids: Vec<ChunkId> = self.chunks.iter().map(|chunk| chunk.id).collect();
        for batch in ids.chunks(EXTRACT_BATCH) {
            for (&id, (text, _)) in batch.iter().zip(self.texts_for(batch)) {
                let name = format!("chunk_{id:06}.txt");
                fs::write(staging.path().join(&name), text)?;
                names.push(name);
            }
        }

        if dir.exists() {
            fs::remove_dir(dir)?;
        }
        fs::rename(staging.path(), dir)?;
        info!(dir = %dir.display(), files = names.len(), "chunks extracted");

        Ok(names.into_iter().map(|name| dir.join(name)).collect())
    }
}
