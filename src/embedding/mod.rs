//! Embedding providers and the brute-force similarity index over chunk vectors.
//!
//! Vector `i` always belongs to chunk `i`; search results carry the chunk id directly.

mod tfidf;
mod tokenizer;


pub use tfidf::{TfIdfModel, DEFAULT_DIMENSION, TFIDF_MODEL_ID};
pub use tokenizer::tokenize;

use crate::chunk::ChunkId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Anything that maps text to fixed-width vectors.
///
/// `fit` is called once over the whole corpus at build time; `transform` is called for
/// every chunk and, at read time, for every query.
pub trait EmbeddingProvider: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
    fn fit(&mut self, texts: &[&str]);
    fn transform(&self, text: &str) -> Vec<f32>;

    /// What the container records about this provider.
    fn stored(&self) -> StoredModel {
        StoredModel::External {
            model_id: self.model_id().to_string(),
            dimension: self.dimension(),
        }
    }
}

/// Model state persisted next to the vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredModel {
    /// Enough to rebuild the baseline model and embed queries at read time.
    TfIdf { vocabulary: Vec<String>, idf: Vec<f32> },
    /// Vectors came from a provider that must be supplied again when reading.
    External { model_id: String, dimension: usize },
}

impl StoredModel {
    pub fn model_id(&self) -> &str {
        match self {
            StoredModel::TfIdf { .. } => TFIDF_MODEL_ID,
            StoredModel::External { model_id, .. } => model_id,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            StoredModel::TfIdf { vocabulary, .. } if vocabulary.is_empty() => DEFAULT_DIMENSION,
            StoredModel::TfIdf { vocabulary, .. } => vocabulary.len(),
            StoredModel::External { dimension, .. } => *dimension,
        }
    }

    /// A ready provider, when the model can be rebuilt from what was stored.
    pub fn restore(&self) -> Option<Box<dyn EmbeddingProvider>> {
        match self {
            StoredModel::TfIdf { vocabulary, idf } => {
                Some(Box::new(TfIdfModel::from_parts(vocabulary.clone(), idf.clone())))
            }
            StoredModel::External { .. } => None,
        }
    }
}

// ------------------------------------------------------------------
// 1. Similarity
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Dot,
    /// Reported as `1 / (1 + distance)` so that larger is still better.
    Euclidean,
}

impl SimilarityMetric {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine(a, b),
            SimilarityMetric::Dot => dot(a, b),
            SimilarityMetric::Euclidean => {
                let dist = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + dist)
            }
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Dot => "dot",
            SimilarityMetric::Euclidean => "euclidean",
        };
        f.write_str(name)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

// ------------------------------------------------------------------
// 2. Index
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: ChunkId,
    pub score: f32,
    /// 0-based position in the ranking.
    pub rank: usize,
}

pub struct EmbeddingIndex {
    provider: Box<dyn EmbeddingProvider>,
    vectors: Vec<Vec<f32>>,
    metric: SimilarityMetric,
}

impl fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("model", &self.provider.model_id())
            .field("dimension", &self.provider.dimension())
            .field("vectors", &self.vectors.len())
            .field("metric", &self.metric)
            .finish()
    }
}

impl EmbeddingIndex {
    /// Fit `provider` on `texts` and embed each of them.
    pub fn build(mut provider: Box<dyn EmbeddingProvider>, texts: &[&str]) -> Self {
        provider.fit(texts);
        let vectors = texts.iter().map(|text| provider.transform(text)).collect();
        Self::from_parts(provider, vectors)
    }

    /// Wrap vectors that were computed earlier by `provider`.
    pub fn from_parts(provider: Box<dyn EmbeddingProvider>, vectors: Vec<Vec<f32>>) -> Self {
        Self {
            provider,
            vectors,
            metric: SimilarityMetric::default(),
        }
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        self.provider.transform(text)
    }

    /// Rank every chunk against `query`.
    pub fn search(&self, query: &str, top_k: usize, threshold: f32) -> Vec<SearchResult> {
        if self.vectors.is_empty() || top_k == 0 {
            return Vec::new();
        }
        self.search_vector(&self.embed(query), top_k, threshold)
    }

    /// Keep scores at or above `threshold`, best first, ties broken by ascending id.
    pub fn search_vector(&self, query: &[f32], top_k: usize, threshold: f32) -> Vec<SearchResult> {
        let mut scored: Vec<(ChunkId, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, vector)| (pos as ChunkId, self.metric.score(query, vector)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .enumerate()
            .map(|(rank, (id, score))| SearchResult { id, score, rank })
            .collect()
    }
}
