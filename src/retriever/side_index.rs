//! Optional `<container>.idx` file holding the already decompressed manifest.
//!
//! Never authoritative: it is only used when its recorded payload checksum matches the
//! container, and any problem reading it just means the container is used instead.

use crate::error::Result;
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Serialize, Deserialize)]
struct SideIndex {
    payload_crc32: u32,
    /// Encoded manifest, checked again by `Manifest::decode` on load.
    manifest: Vec<u8>,
}

pub fn path_for(container: &Path) -> PathBuf {
    let mut name = OsString::from(container.as_os_str());
    name.push(".idx");
    PathBuf::from(name)
}

/// Write the side index next to `container` and return its path.
pub fn write(container: &Path, manifest: &Manifest, payload_crc32: u32) -> Result<PathBuf> {
    let target = path_for(container);
    let bytes = bincode::serialize(&SideIndex {
        payload_crc32,
        manifest: manifest.encode()?,
    })?;

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(&bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(&target).map_err(|err| err.error)?;

    debug!(path = %target.display(), "side index written");
    Ok(target)
}

/// The manifest stored beside `container`, if there is one for this exact payload.
pub fn load(container: &Path, payload_crc32: u32) -> Option<Manifest> {
    let path = path_for(container);
    let bytes = std::fs::read(&path).ok()?;

    let side: SideIndex = match bincode::deserialize(&bytes) {
        Ok(side) => side,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring unreadable side index");
            return None;
        }
    };
    if side.payload_crc32 != payload_crc32 {
        debug!(path = %path.display(), "ignoring stale side index");
        return None;
    }
    match Manifest::decode(&side.manifest) {
        Ok(manifest) => Some(manifest),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring invalid side index");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::StoredModel;

    fn manifest() -> Manifest {
        Manifest {
            chunks: vec![],
            embeddings: vec![],
            model: StoredModel::External {
                model_id: "m".into(),
                dimension: 3,
            },
        }
    }

    #[test]
    fn path_appends_idx() {
        assert_eq!(path_for(Path::new("/tmp/a.nsm")), PathBuf::from("/tmp/a.nsm.idx"));
    }

    #[test]
    fn load_requires_matching_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("c.nsm");
        let written = write(&container, &manifest(), 42).unwrap();
        assert!(written.exists());

        assert_eq!(load(&container, 42), Some(manifest()));
        assert_eq!(load(&container, 43), None);
    }

    #[test]
    fn garbage_side_index_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let container = dir.path().join("c.nsm");
        std::fs::write(path_for(&container), b"junk").unwrap();
        assert_eq!(load(&container, 0), None);
        assert_eq!(load(&dir.path().join("missing.nsm"), 0), None);
    }
}
