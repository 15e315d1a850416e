use super::*;
use crate::error::FormatError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Cursor;
use uuid::Uuid;

fn sample_metadata() -> Metadata {
    Metadata {
        format_version: FORMAT_VERSION,
        container_id: Uuid::new_v4(),
        created_at: Utc::now(),
        compression: "zlib".into(),
        compression_ratio: 0.5,
        embedding_model: "tfidf".into(),
        license_hash: Some("0123456789abcdef".into()),
        chunk_count: 2,
        uncompressed_size: 64,
        compressed_size: 32,
        storage: ContentType::Inline,
        extra: BTreeMap::new(),
    }
}

fn sample_index(payload: &[u8]) -> ContainerIndex {
    ContainerIndex {
        content_type: ContentType::Inline,
        compression: "zlib".into(),
        embedding_dim: 8,
        manifest_len: payload.len() as u64,
        payload_crc32: Some(crc32fast::hash(payload)),
        frames: Vec::new(),
    }
}

fn image(metadata: &[u8], index: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_blocks(&mut out, metadata, index, payload).unwrap();
    out
}

#[test]
fn block_round_trip_is_byte_identical() {
    let metadata = br#"{"created_at":"2025-06-27","compression":"zstd"}"#;
    let index = br#"{"content_type":"inline"}"#;
    let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

    let bytes = image(metadata, index, &payload);
    assert_eq!(bytes.len(), HEADER_SIZE + metadata.len() + index.len() + payload.len());

    let raw = read_blocks(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(raw.metadata, metadata);
    assert_eq!(raw.index, index);
    assert_eq!(raw.payload, payload);

    let view = parse_blocks(&bytes).unwrap();
    assert_eq!(view.metadata, metadata);
    assert_eq!(view.index, index);
    assert_eq!(view.payload, &payload[..]);
}

#[test]
fn empty_blocks_round_trip() {
    let bytes = image(b"", b"", b"");
    assert_eq!(bytes.len(), HEADER_SIZE);
    let raw = read_blocks(&mut Cursor::new(&bytes)).unwrap();
    assert!(raw.metadata.is_empty() && raw.index.is_empty() && raw.payload.is_empty());
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.nsm");
    let payload = b"compressed bytes go here".to_vec();
    let metadata = sample_metadata();
    let index = sample_index(&payload);

    write(&path, &metadata, &index, &payload).unwrap();
    let container = read(&path).unwrap();

    assert_eq!(container.metadata, metadata);
    assert_eq!(container.index, index);
    assert_eq!(container.payload, payload);
    assert!(validate(&path));

    // Only the container itself remains in the directory.
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn flipping_any_magic_byte_rejects_the_file() {
    let bytes = image(b"{}", b"{}", b"payload");
    for i in 0..MAGIC.len() {
        let mut corrupt = bytes.clone();
        corrupt[i] ^= 0xff;
        assert!(matches!(
            read_blocks(&mut Cursor::new(&corrupt)),
            Err(FormatError::BadMagic { .. })
        ));
        assert!(matches!(parse_blocks(&corrupt), Err(FormatError::BadMagic { .. })));
    }
}

#[test]
fn short_header_is_rejected() {
    let bytes = image(b"{}", b"{}", b"payload");
    for len in [0, 1, 4, 36, HEADER_SIZE - 1] {
        assert!(matches!(
            read_blocks(&mut Cursor::new(&bytes[..len])),
            Err(FormatError::TooShort { .. })
        ));
    }
}

#[test]
fn truncated_payload_is_rejected() {
    let bytes = image(b"{}", b"{}", b"0123456789");
    let cut = &bytes[..bytes.len() - 3];
    match read_blocks(&mut Cursor::new(cut)) {
        Err(FormatError::Truncated { block, expected, found }) => {
            assert_eq!(block, "payload");
            assert_eq!(expected, 10);
            assert_eq!(found, 7);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(parse_blocks(cut), Err(FormatError::Truncated { block: "payload", .. })));
}

#[test]
fn checksum_mismatch_rejects_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.nsm");
    let payload = b"original payload".to_vec();
    let mut index = sample_index(&payload);
    index.payload_crc32 = Some(crc32fast::hash(b"something else"));

    write(&path, &sample_metadata(), &index, &payload).unwrap();
    assert!(matches!(read(&path), Err(FormatError::ChecksumMismatch { .. })));
    assert!(!validate(&path));
}

#[test]
fn validate_is_false_for_missing_or_garbage_files() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!validate(dir.path().join("missing.nsm")));

    let garbage = dir.path().join("garbage.nsm");
    std::fs::write(&garbage, b"not a container at all").unwrap();
    assert!(!validate(&garbage));
}
