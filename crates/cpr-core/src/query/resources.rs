//! Read-only lookups over what a run has already produced.

use std::io::Read;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::{CprError, CprResult};
use crate::models::{Artifact, ArtifactKind, Manifest, SourceIndex};
use crate::query::guards::MAX_PREVIEW_BYTES;
use crate::query::parse_repo::ParseService;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePreview {
    pub relpath: String,
    pub size_bytes: u64,
    pub truncated: bool,
    pub text: String,
}

/// Relpaths must stay inside the run root.
fn check_relpath(relpath: &str) -> CprResult<()> {
    let path = Path::new(relpath);
    let escapes = relpath.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CprError::PermissionDenied(format!(
            "path escapes repository root: {relpath}"
        )));
    }
    Ok(())
}

fn source_index(service: &ParseService, run_id: &str) -> CprResult<SourceIndex> {
    service
        .runs()
        .get_source_index(run_id)?
        .ok_or_else(|| CprError::NotFound(format!("unknown run: {run_id}")))
}

pub fn read_run_manifest(service: &ParseService, run_id: &str) -> CprResult<Manifest> {
    service
        .runs()
        .get_manifest(run_id)?
        .ok_or_else(|| CprError::NotFound(format!("no manifest for run: {run_id}")))
}

pub fn read_artifact_by_sha(
    service: &ParseService,
    run_id: &str,
    sha256: &str,
    kind: ArtifactKind,
) -> CprResult<Artifact> {
    let bytes = service.artifacts().read(run_id, sha256, kind)?;
    Artifact::from_bytes(&bytes)
}

/// Resolve `relpath` through the run's source index and read its artifact.
/// The synthetic kind returns the source index itself.
pub fn read_artifact_by_relpath(
    service: &ParseService,
    run_id: &str,
    kind: ArtifactKind,
    relpath: &str,
) -> CprResult<Artifact> {
    let index = source_index(service, run_id)?;
    if kind.is_synthetic() {
        return Ok(Artifact::Ok {
            data: serde_json::to_value(&index)?,
        });
    }
    check_relpath(relpath)?;
    let file = index
        .find(relpath)
        .ok_or_else(|| CprError::NotFound(format!("{relpath} is not part of run {run_id}")))?;
    if kind.source_file_kind() != Some(file.kind) {
        return Err(CprError::InvalidArgument(format!(
            "{relpath} has no {kind} artifact"
        )));
    }
    read_artifact_by_sha(service, run_id, &file.sha256, kind)
}

/// First 128 KiB of a file under the run root, decoded lossily.
pub fn read_file_preview(service: &ParseService, run_id: &str, relpath: &str) -> CprResult<FilePreview> {
    check_relpath(relpath)?;
    let index = source_index(service, run_id)?;
    let root = std::fs::canonicalize(&index.root)?;
    let path = match std::fs::canonicalize(root.join(relpath)) {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CprError::NotFound(format!("file not found: {relpath}")))
        }
        Err(e) => return Err(e.into()),
    };
    if !path.starts_with(&root) {
        return Err(CprError::PermissionDenied(format!(
            "path escapes repository root: {relpath}"
        )));
    }
    if !path.is_file() {
        return Err(CprError::NotFound(format!("not a file: {relpath}")));
    }

    let file = std::fs::File::open(&path)?;
    let size_bytes = file.metadata()?.len();
    let mut buf = Vec::new();
    file.take(MAX_PREVIEW_BYTES).read_to_end(&mut buf)?;
    tracing::debug!(run_id, relpath, size_bytes, "file preview");
    Ok(FilePreview {
        relpath: relpath.to_string(),
        size_bytes,
        truncated: size_bytes > buf.len() as u64,
        text: String::from_utf8_lossy(&buf).to_string(),
    })
}
