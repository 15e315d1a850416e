//! Baseline TF-IDF embedding.

use super::tokenizer::tokenize;
use super::{EmbeddingProvider, StoredModel};
use std::collections::{HashMap, HashSet};

pub const TFIDF_MODEL_ID: &str = "simple_tfidf";
/// Width of the zero vector produced before any vocabulary exists.
pub const DEFAULT_DIMENSION: usize = 100;

/// Vocabulary slots are assigned in first-seen order across the fitted corpus.
#[derive(Debug, Clone, Default)]
pub struct TfIdfModel {
    vocabulary: Vec<String>,
    idf: Vec<f32>,
    slots: HashMap<String, usize>,
}

impl TfIdfModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a fitted model from its stored vocabulary and weights.
    pub fn from_parts(vocabulary: Vec<String>, idf: Vec<f32>) -> Self {
        let slots = vocabulary
            .iter()
            .enumerate()
            .map(|(slot, term)| (term.clone(), slot))
            .collect();
        Self { vocabulary, idf, slots }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn idf(&self) -> &[f32] {
        &self.idf
    }
}

impl EmbeddingProvider for TfIdfModel {
    fn model_id(&self) -> &str {
        TFIDF_MODEL_ID
    }

    fn dimension(&self) -> usize {
        if self.vocabulary.is_empty() {
            DEFAULT_DIMENSION
        } else {
            self.vocabulary.len()
        }
    }

    fn fit(&mut self, texts: &[&str]) {
        let mut vocabulary = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<u32> = Vec::new();

        for text in texts {
            let mut seen = HashSet::new();
            for token in tokenize(text) {
                let slot = match slots.get(&token) {
                    Some(&slot) => slot,
                    None => {
                        let slot = vocabulary.len();
                        slots.insert(token.clone(), slot);
                        vocabulary.push(token);
                        doc_freq.push(0);
                        slot
                    }
                };
                if seen.insert(slot) {
                    doc_freq[slot] += 1;
                }
            }
        }

        let docs = texts.len() as f32;
        self.idf = doc_freq.iter().map(|&df| (docs / df as f32).ln()).collect();
        self.vocabulary = vocabulary;
        self.slots = slots;
    }

    fn transform(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension()];
        if self.vocabulary.is_empty() {
            return vector;
        }

        let tokens = tokenize(text);
        let total = tokens.len() as f32;
        let mut counts: HashMap<usize, u32> = HashMap::new();
        for token in &tokens {
            if let Some(&slot) = self.slots.get(token) {
                *counts.entry(slot).or_insert(0) += 1;
            }
        }
        for (slot, count) in counts {
            vector[slot] = count as f32 / total * self.idf[slot];
        }
        vector
    }

    fn stored(&self) -> StoredModel {
        StoredModel::TfIdf {
            vocabulary: self.vocabulary.clone(),
            idf: self.idf.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted(texts: &[&str]) -> TfIdfModel {
        let mut model = TfIdfModel::new();
        model.fit(texts);
        model
    }

    #[test]
    fn vocabulary_is_first_seen_order() {
        let model = fitted(&["Beta alpha", "alpha gamma beta"]);
        assert_eq!(model.vocabulary(), &["beta", "alpha", "gamma"]);
        assert_eq!(model.dimension(), 3);
    }

    #[test]
    fn idf_is_log_of_inverse_document_frequency() {
        let model = fitted(&["a b", "a c", "a a"]);
        assert_eq!(model.idf()[0], 0.0);
        assert!((model.idf()[1] - 3f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn transform_weights_term_frequency() {
        let model = fitted(&["a b", "c d"]);
        let v = model.transform("a a b unknown");
        let idf = 2f32.ln();
        assert!((v[0] - 0.5 * idf).abs() < 1e-6);
        assert!((v[1] - 0.25 * idf).abs() < 1e-6);
        assert_eq!(&v[2..], &[0.0, 0.0]);
    }

    #[test]
    fn unfitted_model_gives_default_zero_vector() {
        let v = TfIdfModel::new().transform("anything");
        assert_eq!(v.len(), DEFAULT_DIMENSION);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn restored_model_matches_the_original() {
        let model = fitted(&["one two", "two three"]);
        let restored = TfIdfModel::from_parts(model.vocabulary().to_vec(), model.idf().to_vec());
        assert_eq!(model.transform("two three three"), restored.transform("two three three"));
    }
}
