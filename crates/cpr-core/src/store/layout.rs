//! On-disk layout of a run under the cache directory.
//!
//! ```text
//! <cache_dir>/runs/<run_id>/source-index.json
//! <cache_dir>/runs/<run_id>/manifest.json
//! <cache_dir>/runs/<run_id>/artifacts/<sha256>.<kind>.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{CprError, CprResult};
use crate::models::ArtifactKind;

#[derive(Clone, Debug)]
pub struct CacheLayout {
    cache_dir: PathBuf,
}

impl CacheLayout {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn run_dir(&self, run_id: &str) -> CprResult<PathBuf> {
        validate_segment("run_id", run_id)?;
        Ok(self.cache_dir.join("runs").join(run_id))
    }

    pub fn artifacts_dir(&self, run_id: &str) -> CprResult<PathBuf> {
        Ok(self.run_dir(run_id)?.join("artifacts"))
    }

    pub fn source_index_path(&self, run_id: &str) -> CprResult<PathBuf> {
        Ok(self.run_dir(run_id)?.join("source-index.json"))
    }

    pub fn manifest_path(&self, run_id: &str) -> CprResult<PathBuf> {
        Ok(self.run_dir(run_id)?.join("manifest.json"))
    }

    pub fn artifact_path(&self, run_id: &str, sha256: &str, kind: ArtifactKind) -> CprResult<PathBuf> {
        validate_segment("sha256", sha256)?;
        Ok(self
            .artifacts_dir(run_id)?
            .join(format!("{sha256}.{}.json", kind.as_str())))
    }
}

/// Reject identifiers that would escape their directory when joined.
pub fn validate_segment(what: &str, value: &str) -> CprResult<()> {
    let ok = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CprError::InvalidArgument(format!("invalid {what}: {value:?}")))
    }
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written document.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CprResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| CprError::InvalidArgument(format!("no parent dir: {}", path.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| CprError::Io(e.error))?;
    Ok(())
}

/// Read a whole document, mapping a missing file to `NotFound`.
pub fn read_document(path: &Path, what: &str) -> CprResult<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CprError::NotFound(format!("{what} not found: {}", path.display())))
        }
        Err(e) => Err(CprError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = CacheLayout::new("/c");
        assert_eq!(
            layout.manifest_path("cpr_1").unwrap(),
            PathBuf::from("/c/runs/cpr_1/manifest.json")
        );
        assert_eq!(
            layout.artifact_path("cpr_1", "abc", ArtifactKind::Program).unwrap(),
            PathBuf::from("/c/runs/cpr_1/artifacts/abc.program.json")
        );
    }

    #[test]
    fn test_traversal_segments_rejected() {
        let layout = CacheLayout::new("/c");
        assert!(layout.run_dir("..").is_err());
        assert!(layout.run_dir("a/b").is_err());
        assert!(layout.run_dir("").is_err());
        assert!(layout.artifact_path("r", "../x", ArtifactKind::Copybook).is_err());
    }

    #[test]
    fn test_write_atomic_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/doc.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert!(matches!(
            read_document(&dir.path().join("missing.json"), "doc"),
            Err(CprError::NotFound(_))
        ));
    }
}
