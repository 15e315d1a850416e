//! Nexus Simple Memory.
//!
//! Packs a set of text fragments into one read-only container (header, metadata,
//! index, compressed payload) and answers similarity queries against it.
//!
//! Build side: [`ContainerBuilder`] chunks the texts, asks a [`QuotaGate`], embeds the
//! chunks, compresses the manifest with the smallest of several algorithms and writes the
//! file. Read side: [`Retriever`] maps the file, ranks chunks against a query and
//! fetches their text through a bounded decode cache.

pub mod builder;
pub mod cache;
pub mod chunk;
pub mod compression;
pub mod config;
pub mod embedding;
pub mod error;
pub mod format;
pub mod manifest;
pub mod quota;
pub mod retriever;

pub use builder::{BuildReport, ContainerBuilder, StorageLayout};
pub use cache::{CacheStats, FrameCache, UnitId};
pub use chunk::{Chunk, ChunkId, ChunkStore, ChunkingConfig};
pub use compression::{Compressed, CompressionSelector, CompressionTag};
pub use config::NsmConfig;
pub use embedding::{EmbeddingIndex, EmbeddingProvider, SearchResult, SimilarityMetric, TfIdfModel};
pub use error::{NsmError, Result};
pub use format::{Container, ContainerIndex, ContentType, Metadata};
pub use quota::{QuotaGate, TokenQuota, UnlimitedQuota};
pub use retriever::{RetrievedChunk, Retriever, RetrieverStats};
