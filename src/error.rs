//! Error taxonomy for container reads, payload decoding, building and lookups.
//!
//! Fatal conditions (`FormatError`, `DecodeError`) abort the operation they occur in.
//! Recoverable ones (`CompressionTrialError`, `DecodeUnitError`) are reported to the
//! caller that skips the candidate or falls back to raw text.

use crate::cache::UnitId;
use crate::compression::CompressionTag;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NsmError>;

/// A container that cannot be trusted. The file is rejected as a whole.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("container too short: {found} bytes, header needs {needed}")]
    TooShort { found: usize, needed: usize },
    #[error("bad magic tag {found:02x?}")]
    BadMagic { found: [u8; 4] },
    #[error("unsupported format version {found} (max supported {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("reserved header field `{field}` is not zero")]
    ReservedNotZero { field: &'static str },
    #[error("truncated {block} block: expected {expected} bytes, found {found}")]
    Truncated {
        block: &'static str,
        expected: u64,
        found: u64,
    },
    #[error("invalid metadata block: {0}")]
    Metadata(#[source] serde_json::Error),
    #[error("invalid index block: {0}")]
    Index(#[source] serde_json::Error),
    #[error("payload checksum mismatch: expected {expected:08x}, found {found:08x}")]
    ChecksumMismatch { expected: u32, found: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Payload bytes that cannot be turned back into their original form.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown compression tag `{0}`")]
    UnknownTag(String),
    #[error("corrupt {tag} stream: {source}")]
    Corrupt {
        tag: CompressionTag,
        #[source]
        source: io::Error,
    },
    #[error("invalid manifest: {0}")]
    Manifest(#[from] bincode::Error),
}

/// One candidate algorithm failed while compressing during a build.
#[derive(Error, Debug)]
#[error("{tag} candidate failed: {source}")]
pub struct CompressionTrialError {
    pub tag: CompressionTag,
    #[source]
    pub source: io::Error,
}

/// One storage unit failed to decode during a lookup.
#[derive(Error, Debug, Clone)]
pub enum DecodeUnitError {
    #[error("unit {0} is not present in the frame table")]
    UnknownUnit(UnitId),
    #[error("unit {unit} checksum mismatch: expected {expected:08x}, found {found:08x}")]
    ChecksumMismatch { unit: UnitId, expected: u32, found: u32 },
    #[error("unit {unit} failed to decompress: {reason}")]
    Decompress { unit: UnitId, reason: String },
    #[error("unit {0} is not valid UTF-8")]
    InvalidText(UnitId),
    #[error("unit {0} was not decoded before the deadline")]
    DeadlineExceeded(UnitId),
    #[error("decoder panicked on unit {0}")]
    Panicked(UnitId),
    #[error("decode worker for unit {0} went away")]
    WorkerLost(UnitId),
    #[error("unit {unit}: {reason}")]
    Failed { unit: UnitId, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    ZeroSize,
    #[error("overlap {overlap} must be smaller than chunk size {size}")]
    OverlapTooLarge { size: usize, overlap: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum NsmError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("insufficient quota to build {requested} bytes")]
    QuotaDenied { requested: u64 },
    #[error("nothing to build: the chunk store is empty")]
    EmptyCorpus,
    #[error("embedding model mismatch: container has {stored}, provider is {provided}")]
    ModelMismatch { stored: String, provided: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("cannot start decode workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NsmError {
    /// True when the error rejects a container file (as opposed to a build or I/O failure).
    pub fn is_invalid_container(&self) -> bool {
        matches!(self, NsmError::Format(_) | NsmError::Decode(_))
    }
}

impl From<bincode::Error> for NsmError {
    fn from(err: bincode::Error) -> Self {
        NsmError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for NsmError {
    fn from(err: serde_json::Error) -> Self {
        NsmError::Serialization(err.to_string())
    }
}
