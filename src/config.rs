//! Runtime configuration: TOML file, then environment overrides.

use crate::chunk::ChunkingConfig;
use crate::compression::{CompressionSelector, CompressionTag};
use crate::embedding::SimilarityMetric;
use crate::error::ConfigError;
use crate::format::ContentType;
use crate::quota::DEFAULT_TOKENS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ------------------------------------------------------------------
// 1. Sections
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Level for zstd and zlib. LZ4 keeps its own default.
    pub level: i32,
    /// Tried in order; the first of equally small outputs wins.
    pub candidates: Vec<CompressionTag>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 6,
            candidates: CompressionTag::CANDIDATES.to_vec(),
        }
    }
}

impl CompressionConfig {
    pub fn selector(&self) -> CompressionSelector {
        CompressionSelector::new(self.candidates.clone()).with_level(self.level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub storage: ContentType,
    /// Chunks per frame when `storage = "frames"`.
    pub chunks_per_frame: usize,
    /// Also write the `<container>.idx` side index.
    pub side_index: bool,
    /// Tokens a license key may spend on one build (one per started GiB).
    pub license_tokens: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            storage: ContentType::Inline,
            chunks_per_frame: 16,
            side_index: false,
            license_tokens: DEFAULT_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of decoded units kept in memory.
    pub cache_size: usize,
    pub workers: usize,
    /// 0 waits forever.
    pub decode_timeout_ms: u64,
    pub top_k: usize,
    pub threshold: f32,
    pub metric: SimilarityMetric,
    /// Read the side index when one matches the container.
    pub use_side_index: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache_size: 1000,
            workers: 4,
            decode_timeout_ms: 30_000,
            top_k: 5,
            threshold: 0.0,
            metric: SimilarityMetric::Cosine,
            use_side_index: true,
        }
    }
}

impl RetrievalConfig {
    pub fn decode_timeout(&self) -> Option<Duration> {
        (self.decode_timeout_ms > 0).then(|| Duration::from_millis(self.decode_timeout_ms))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NsmConfig {
    pub chunking: ChunkingConfig,
    pub compression: CompressionConfig,
    pub build: BuildConfig,
    pub retrieval: RetrievalConfig,
}

// ------------------------------------------------------------------
// 2. Loading
// ------------------------------------------------------------------

impl NsmConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: NsmConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus `NSM_*` overrides. A `.env` file in the working directory is loaded
    /// first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::default().with_env()
    }

    /// Apply `NSM_*` variables from the process environment on top of `self`.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// ENV vars: NSM_CHUNK_SIZE, NSM_CHUNK_OVERLAP, NSM_CACHE_SIZE, NSM_WORKERS,
    /// NSM_DECODE_TIMEOUT_MS, NSM_COMPRESSION_LEVEL, NSM_TOP_K, NSM_LICENSE_TOKENS
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "NSM_CHUNK_SIZE")? {
            self.chunking.size = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_CHUNK_OVERLAP")? {
            self.chunking.overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_CACHE_SIZE")? {
            self.retrieval.cache_size = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_WORKERS")? {
            self.retrieval.workers = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_DECODE_TIMEOUT_MS")? {
            self.retrieval.decode_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_COMPRESSION_LEVEL")? {
            self.compression.level = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_TOP_K")? {
            self.retrieval.top_k = v;
        }
        if let Some(v) = parse_var(&lookup, "NSM_LICENSE_TOKENS")? {
            self.build.license_tokens = v;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}

// ------------------------------------------------------------------
// 3. Validation
// ------------------------------------------------------------------

impl NsmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if !(1..=9).contains(&self.compression.level) {
            return Err(ConfigError::Invalid(format!(
                "compression level {} outside 1..=9",
                self.compression.level
            )));
        }
        if self.compression.candidates.is_empty() {
            return Err(ConfigError::Invalid("no compression candidates".into()));
        }
        if self.build.chunks_per_frame == 0 {
            return Err(ConfigError::Invalid("chunks_per_frame must be > 0".into()));
        }
        if self.retrieval.workers == 0 {
            return Err(ConfigError::Invalid("workers must be > 0".into()));
        }
        if !self.retrieval.threshold.is_finite() {
            return Err(ConfigError::Invalid("threshold must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = NsmConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.size, 1000);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(config.retrieval.cache_size, 1000);
        assert_eq!(config.retrieval.decode_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = NsmConfig::from_toml(
            r#"
            [chunking]
            size = 400

            [compression]
            candidates = ["zlib", "lz4"]

            [build]
            storage = "frames"
            chunks_per_frame = 4

            [retrieval]
            decode_timeout_ms = 0
            metric = "dot"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.size, 400);
        assert_eq!(config.chunking.overlap, 100);
        assert_eq!(
            config.compression.candidates,
            vec![CompressionTag::Zlib, CompressionTag::Lz4]
        );
        assert_eq!(config.build.storage, ContentType::Frames);
        assert_eq!(config.retrieval.decode_timeout(), None);
        assert_eq!(config.retrieval.metric, SimilarityMetric::Dot);
        assert_eq!(config.retrieval.workers, 4);
    }

    #[test]
    fn invalid_toml_values_are_rejected() {
        assert!(matches!(
            NsmConfig::from_toml("[chunking]\nsize = 10\noverlap = 10\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NsmConfig::from_toml("[compression]\ncandidates = [\"brotli\"]\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let config = NsmConfig::default()
            .with_overrides(lookup(&[
                ("NSM_CHUNK_SIZE", "200"),
                ("NSM_CHUNK_OVERLAP", " 20 "),
                ("NSM_WORKERS", "2"),
                ("NSM_COMPRESSION_LEVEL", "9"),
                ("NSM_TOP_K", "3"),
                ("NSM_LICENSE_TOKENS", "0"),
            ]))
            .unwrap();
        assert_eq!(config.chunking.size, 200);
        assert_eq!(config.chunking.overlap, 20);
        assert_eq!(config.retrieval.workers, 2);
        assert_eq!(config.compression.level, 9);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.build.license_tokens, 0);
        assert_eq!(config.retrieval.cache_size, 1000);
    }

    #[test]
    fn unparsable_env_value_names_the_key() {
        let err = NsmConfig::default()
            .with_overrides(lookup(&[("NSM_CACHE_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "NSM_CACHE_SIZE", .. }));
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nsm.toml");
        std::fs::write(&path, "[retrieval]\ncache_size = 2\n").unwrap();
        assert_eq!(NsmConfig::from_file(&path).unwrap().retrieval.cache_size, 2);
        assert!(matches!(
            NsmConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
