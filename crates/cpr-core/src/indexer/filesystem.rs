//! Filesystem scanning and fingerprinting for source index builds.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::errors::{CprError, CprResult};
use crate::models::{FileKind, SourceFile, SourceIndex};

const HASH_BUFFER_BYTES: usize = 1024 * 1024;

const IMPLICIT_IGNORED_DIRS: &[&str] = &[".git"];

static PROGRAM_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bPROGRAM-ID\s*\.\s*'?([A-Za-z0-9][A-Za-z0-9-]*)").unwrap()
});

/// Streamed SHA-256 of a file plus, when requested, the program id found in
/// the first chunk.
struct Fingerprint {
    sha256: String,
    program_id_guess: Option<String>,
}

fn fingerprint_file(path: &Path, guess_program_id: bool) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_BYTES];
    let mut program_id_guess = None;
    let mut first = true;
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        if first && guess_program_id {
            program_id_guess = guess_program_id_in(&buf[..read]);
        }
        first = false;
        hasher.update(&buf[..read]);
    }
    Ok(Fingerprint {
        sha256: format!("{:x}", hasher.finalize()),
        program_id_guess,
    })
}

fn guess_program_id_in(chunk: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(chunk);
    PROGRAM_ID_RE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase())
}

/// Compute the hex SHA-256 of a file without loading it whole.
pub fn compute_content_hash(path: &Path) -> CprResult<String> {
    Ok(fingerprint_file(path, false)?.sha256)
}

/// Forward-slash relative path of `path` under `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && IMPLICIT_IGNORED_DIRS
            .iter()
            .any(|d| entry.file_name().to_string_lossy() == *d)
}

/// Walk `root` and fingerprint every regular file.
///
/// Entries that cannot be stat'd or read during the walk are skipped. The
/// order of `files` is whatever the walk produced.
pub fn build_source_index(root: &Path) -> CprResult<SourceIndex> {
    if !root.is_dir() {
        return Err(CprError::NotFound(format!(
            "paths_root not found: {}",
            root.display()
        )));
    }
    let started = Instant::now();
    let mut files = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(error = %err, "walk entry skipped");
                skipped += 1;
                continue;
            }
        };
        // Symlinked files count; symlinked directories are not descended.
        if !entry.path().is_file() {
            continue;
        }
        let metadata = match std::fs::metadata(entry.path()) {
            Ok(m) => m,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        let relpath = relative_path(root, entry.path());
        let kind = FileKind::from_relpath(&relpath);
        let fingerprint = match fingerprint_file(entry.path(), kind == FileKind::Cobol) {
            Ok(fp) => fp,
            Err(err) => {
                tracing::debug!(relpath = %relpath, error = %err, "file vanished during index");
                skipped += 1;
                continue;
            }
        };
        files.push(SourceFile {
            relpath,
            size_bytes: metadata.len(),
            sha256: fingerprint.sha256,
            kind,
            language_hint: None,
            encoding: None,
            program_id_guess: fingerprint.program_id_guess,
        });
    }

    tracing::info!(
        root = %root.display(),
        files = files.len(),
        skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "source index built"
    );
    Ok(SourceIndex {
        root: root.to_string_lossy().to_string(),
        files,
    })
}
