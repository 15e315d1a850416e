//! Payload manifest and frame bodies.
//!
//! The manifest is the first section of every payload: chunks, their vectors and the
//! embedding model, bincode encoded and then compressed as one blob. Frame bodies follow
//! it when the container stores chunk text in frames.

use crate::cache::UnitId;
use crate::chunk::{Chunk, ChunkId};
use crate::embedding::StoredModel;
use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
    pub model: StoredModel,
}

impl Manifest {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode and check that vector `i` has a chunk `i` with id `i`.
    pub fn decode(src: &[u8]) -> Result<Self, DecodeError> {
        let manifest: Manifest = bincode::deserialize(src)?;
        manifest.check()?;
        Ok(manifest)
    }

    fn check(&self) -> Result<(), DecodeError> {
        let invalid = |msg: String| DecodeError::Manifest(Box::new(bincode::ErrorKind::Custom(msg)));

        if self.chunks.len() != self.embeddings.len() {
            return Err(invalid(format!(
                "{} chunks but {} vectors",
                self.chunks.len(),
                self.embeddings.len()
            )));
        }
        if let Some((pos, chunk)) = self
            .chunks
            .iter()
            .enumerate()
            .find(|(pos, chunk)| chunk.id != *pos as ChunkId)
        {
            return Err(invalid(format!("chunk at position {pos} has id {}", chunk.id)));
        }
        let dimension = self.model.dimension();
        if let Some(pos) = self.embeddings.iter().position(|v| v.len() != dimension) {
            return Err(invalid(format!("vector {pos} is not {dimension} wide")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameChunk {
    pub id: ChunkId,
    pub text: String,
}

/// JSON text held by one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBody {
    pub unit: UnitId,
    pub chunks: Vec<FrameChunk>,
}

impl FrameBody {
    pub fn new(unit: UnitId, chunks: &[Chunk]) -> Self {
        Self {
            unit,
            chunks: chunks
                .iter()
                .map(|chunk| FrameChunk {
                    id: chunk.id,
                    text: chunk.text.clone(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn text_of(&self, id: ChunkId) -> Option<&str> {
        self.chunks
            .iter()
            .find(|chunk| chunk.id == id)
            .map(|chunk| chunk.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: ChunkId, text: &str) -> Chunk {
        Chunk {
            id,
            text: text.to_string(),
            source: "doc".into(),
            sequence: id as u32,
            offset: 0,
            byte_len: text.len(),
        }
    }

    fn external(dimension: usize) -> StoredModel {
        StoredModel::External {
            model_id: "test".into(),
            dimension,
        }
    }

    #[test]
    fn manifest_decodes_what_it_encodes() {
        let manifest = Manifest {
            chunks: vec![chunk(0, "a"), chunk(1, "b")],
            embeddings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            model: external(2),
        };
        let bytes = manifest.encode().unwrap();
        assert_eq!(Manifest::decode(&bytes).unwrap(), manifest);
    }

    #[test]
    fn inconsistent_manifests_are_rejected() {
        let cases = [
            Manifest {
                chunks: vec![chunk(0, "a")],
                embeddings: vec![],
                model: external(2),
            },
            Manifest {
                chunks: vec![chunk(1, "a")],
                embeddings: vec![vec![0.0, 0.0]],
                model: external(2),
            },
            Manifest {
                chunks: vec![chunk(0, "a")],
                embeddings: vec![vec![0.0; 3]],
                model: external(2),
            },
        ];
        for manifest in cases {
            let bytes = manifest.encode().unwrap();
            assert!(matches!(Manifest::decode(&bytes), Err(DecodeError::Manifest(_))));
        }
        assert!(Manifest::decode(b"\xff\xff").is_err());
    }

    #[test]
    fn frame_body_is_plain_json() {
        let body = FrameBody::new(3, &[chunk(6, "six"), chunk(7, "seven")]);
        let json = String::from_utf8(body.to_json().unwrap()).unwrap();
        assert!(json.starts_with(r#"{"unit":3,"chunks":[{"id":6,"text":"six"}"#));

        let parsed = FrameBody::parse(&json).unwrap();
        assert_eq!(parsed.text_of(7), Some("seven"));
        assert_eq!(parsed.text_of(8), None);
    }
}
