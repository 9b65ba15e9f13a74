//! Shared typed models used across indexing, storage, and query layers.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CprError, CprResult};

// ---------------------------------------------------------------------------
// Contract constants
// ---------------------------------------------------------------------------

/// Version of the cursor payload layout.
pub const CURSOR_VERSION: u32 = 1;

/// Identifies the catalog ordering (kind priority, then relpath). Any change to
/// the ordering must change this value so outstanding cursors are rejected.
pub const ORDER_SCHEME_ID: &str = "krelpath";

/// Catalog key of the synthetic whole-index entry.
pub const SOURCE_INDEX_KEY: &str = "source-index";

// ---------------------------------------------------------------------------
// 1. ArtifactKind
// ---------------------------------------------------------------------------

/// Kind of artifact a catalog entry produces.
///
/// The declaration order is the catalog priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    SourceIndex,
    Copybook,
    Program,
}

impl ArtifactKind {
    /// Every kind in catalog priority order.
    pub const ORDER: [ArtifactKind; 3] = [
        ArtifactKind::SourceIndex,
        ArtifactKind::Copybook,
        ArtifactKind::Program,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::SourceIndex => "source_index",
            ArtifactKind::Copybook => "copybook",
            ArtifactKind::Program => "program",
        }
    }

    pub fn parse(name: &str) -> CprResult<Self> {
        Self::ORDER
            .iter()
            .copied()
            .find(|k| k.as_str() == name.trim())
            .ok_or_else(|| CprError::InvalidArgument(format!("Unknown kind: {name}")))
    }

    /// Parse a caller-supplied kind list. An empty list means every kind.
    /// Duplicates are dropped; the first occurrence keeps its position.
    pub fn parse_list(names: &[String]) -> CprResult<Vec<Self>> {
        if names.is_empty() {
            return Ok(Self::ORDER.to_vec());
        }
        let mut kinds = Vec::with_capacity(names.len());
        for name in names {
            let kind = Self::parse(name)?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// The synthetic kind is produced from the source index and never analyzed.
    pub fn is_synthetic(self) -> bool {
        matches!(self, ArtifactKind::SourceIndex)
    }

    /// File classification feeding this artifact kind.
    pub fn source_file_kind(self) -> Option<FileKind> {
        match self {
            ArtifactKind::SourceIndex => None,
            ArtifactKind::Copybook => Some(FileKind::Copybook),
            ArtifactKind::Program => Some(FileKind::Cobol),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// 2. FileKind
// ---------------------------------------------------------------------------

const KIND_BY_EXTENSION: &[(&str, FileKind)] = &[
    (".cbl", FileKind::Cobol),
    (".cob", FileKind::Cobol),
    (".cpy", FileKind::Copybook),
    (".cpyb", FileKind::Copybook),
    (".jcl", FileKind::Jcl),
    (".bms", FileKind::Bms),
    (".ddl", FileKind::Ddl),
];

/// Coarse classification of a discovered file, derived from its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Cobol,
    Copybook,
    Jcl,
    Bms,
    Ddl,
    Other,
}

impl FileKind {
    pub fn from_relpath(relpath: &str) -> Self {
        let ext = match Path::new(relpath).extension() {
            Some(e) => format!(".{}", e.to_string_lossy().to_lowercase()),
            None => return FileKind::Other,
        };
        KIND_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext.as_str())
            .map(|(_, kind)| *kind)
            .unwrap_or(FileKind::Other)
    }
}

// ---------------------------------------------------------------------------
// 3. SourceFile / SourceIndex
// ---------------------------------------------------------------------------

/// A single discovered file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub relpath: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub kind: FileKind,
    #[serde(default)]
    pub language_hint: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub program_id_guess: Option<String>,
}

/// Every file discovered under a run's root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIndex {
    pub root: String,
    pub files: Vec<SourceFile>,
}

impl SourceIndex {
    pub fn find(&self, relpath: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.relpath == relpath)
    }

    pub fn count_kind(&self, kind: FileKind) -> usize {
        self.files.iter().filter(|f| f.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// 4. CatalogEntry
// ---------------------------------------------------------------------------

/// One unit of enumerable work for a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: ArtifactKind,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

pub type Catalog = Vec<CatalogEntry>;

// ---------------------------------------------------------------------------
// 5. Artifacts
// ---------------------------------------------------------------------------

/// Recorded outcome of a failed analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorArtifact {
    pub key: String,
    pub phase: String,
    pub error_message: String,
}

/// Cached document for one `(fingerprint, kind)` slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Artifact {
    Ok { data: Value },
    Error(ErrorArtifact),
}

impl Artifact {
    pub fn to_bytes(&self) -> CprResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> CprResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Artifact::Error(_))
    }
}

// ---------------------------------------------------------------------------
// 6. Manifest
// ---------------------------------------------------------------------------

/// Run-level bookkeeping, rewritten on every request against the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub paths_root: String,
    pub kinds: Vec<ArtifactKind>,
    pub page_size: usize,
    pub counts: IndexMap<ArtifactKind, usize>,
}

/// Per-kind entry counts for a catalog request, in priority order. Kinds that
/// were not requested report zero.
pub fn counts_per_kind(index: &SourceIndex, kinds: &[ArtifactKind]) -> IndexMap<ArtifactKind, usize> {
    ArtifactKind::ORDER
        .iter()
        .map(|&kind| {
            let count = if !kinds.contains(&kind) {
                0
            } else {
                match kind.source_file_kind() {
                    None => 1,
                    Some(file_kind) => index.count_kind(file_kind),
                }
            };
            (kind, count)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 7. Normalized analyzer results
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub relpath: String,
    pub sha256: String,
}

/// One copybook data item; groups carry children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyItem {
    pub level: String,
    pub name: String,
    pub picture: String,
    #[serde(default)]
    pub occurs: Option<u64>,
    #[serde(default)]
    pub children: Option<Vec<CopyItem>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CamCopybook {
    pub name: String,
    pub source: SourceRef,
    pub items: Vec<CopyItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramDivisions {
    #[serde(default)]
    pub identification: Map<String, Value>,
    #[serde(default)]
    pub environment: Map<String, Value>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub procedure: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRef {
    pub target: String,
    #[serde(default)]
    pub dynamic: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoOp {
    pub op: String,
    pub dataset_ref: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub name: String,
    #[serde(default)]
    pub performs: Vec<String>,
    #[serde(default)]
    pub calls: Vec<CallRef>,
    #[serde(default)]
    pub io_ops: Vec<IoOp>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CamProgram {
    pub program_id: String,
    pub source: SourceRef,
    pub divisions: ProgramDivisions,
    pub paragraphs: Vec<Paragraph>,
    #[serde(default)]
    pub copybooks_used: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(relpath: &str, kind: FileKind) -> SourceFile {
        SourceFile {
            relpath: relpath.to_string(),
            size_bytes: 1,
            sha256: "00".to_string(),
            kind,
            language_hint: None,
            encoding: None,
            program_id_guess: None,
        }
    }

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_relpath("src/A.CBL"), FileKind::Cobol);
        assert_eq!(FileKind::from_relpath("x.cob"), FileKind::Cobol);
        assert_eq!(FileKind::from_relpath("copy/REC.cpy"), FileKind::Copybook);
        assert_eq!(FileKind::from_relpath("copy/REC.cpyb"), FileKind::Copybook);
        assert_eq!(FileKind::from_relpath("jobs/run.jcl"), FileKind::Jcl);
        assert_eq!(FileKind::from_relpath("README"), FileKind::Other);
        assert_eq!(FileKind::from_relpath("notes.txt"), FileKind::Other);
    }

    #[test]
    fn test_parse_list_defaults_and_dedups() {
        assert_eq!(ArtifactKind::parse_list(&[]).unwrap(), ArtifactKind::ORDER.to_vec());
        let kinds = ArtifactKind::parse_list(&[
            "program".to_string(),
            "copybook".to_string(),
            "program".to_string(),
        ])
        .unwrap();
        assert_eq!(kinds, vec![ArtifactKind::Program, ArtifactKind::Copybook]);
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = ArtifactKind::parse("jcl").unwrap_err();
        assert!(matches!(err, CprError::InvalidArgument(_)));
    }

    #[test]
    fn test_artifact_status_tagging() {
        let ok = Artifact::Ok {
            data: serde_json::json!({"name": "REC"}),
        };
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["name"], "REC");

        let err = Artifact::Error(ErrorArtifact {
            key: "a.cbl".to_string(),
            phase: "program".to_string(),
            error_message: "boom".to_string(),
        });
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["phase"], "program");
        let back = Artifact::from_bytes(&err.to_bytes().unwrap()).unwrap();
        assert!(back.is_error());
    }

    #[test]
    fn test_counts_per_kind_zeroes_unrequested() {
        let index = SourceIndex {
            root: "/r".to_string(),
            files: vec![
                file("a.cbl", FileKind::Cobol),
                file("b.cbl", FileKind::Cobol),
                file("c.cpy", FileKind::Copybook),
                file("d.txt", FileKind::Other),
            ],
        };
        let counts = counts_per_kind(&index, &[ArtifactKind::Program]);
        let ordered: Vec<_> = counts.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(
            ordered,
            vec![
                (ArtifactKind::SourceIndex, 0),
                (ArtifactKind::Copybook, 0),
                (ArtifactKind::Program, 2),
            ]
        );

        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"source_index":0,"copybook":0,"program":2}"#);
    }
}
