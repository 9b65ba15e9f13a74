//! Paginated, resumable repository analysis.
//!
//! A request resolves a run (new, resumed by id, or resumed by cursor),
//! builds the catalog for the requested kinds, fills the cache for the
//! requested page and returns that page plus a cursor for the next one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analyzer::AnalyzerSet;
use crate::cursor::{decode_cursor, encode_cursor, Cursor};
use crate::errors::{CprError, CprResult};
use crate::indexer::catalog::build_catalog;
use crate::indexer::filesystem::build_source_index;
use crate::indexer::pipeline::{ensure_page, FillContext, PageFillReport};
use crate::models::{
    counts_per_kind, Artifact, ArtifactKind, CatalogEntry, ErrorArtifact, Manifest, SourceIndex,
};
use crate::query::guards::resolve_page_size;
use crate::settings::{RunStoreBackend, Settings};
use crate::store::cache::{ArtifactStore, FsArtifactStore};
use crate::store::layout::{validate_segment, CacheLayout};
use crate::store::runs::{FsRunStore, RunStore, SqliteRunStore};

const RUN_STORE_DB_NAME: &str = "runs.sqlite3";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseRepoRequest {
    pub paths_root: String,
    #[serde(default)]
    pub page_size: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub kinds: Option<Vec<String>>,
    #[serde(default)]
    pub force_reparse: bool,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl ParseRepoRequest {
    pub fn new(paths_root: impl Into<String>) -> Self {
        Self {
            paths_root: paths_root.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub paths_root: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub counts: IndexMap<ArtifactKind, usize>,
    pub page_size: usize,
}

/// One page entry: exactly one of `data` or `error` is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    pub kind: ArtifactKind,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorArtifact>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParseRepoResponse {
    pub run: RunInfo,
    pub meta: ResponseMeta,
    pub items: Vec<PageItem>,
    pub next_cursor: Option<String>,
}

/// Fresh run identifier, `cpr_<UTC timestamp with microseconds>Z`.
pub fn make_run_id() -> String {
    format!("cpr_{}", Utc::now().format("%Y%m%dT%H%M%S%6fZ"))
}

fn resolve_root(paths_root: &str) -> CprResult<PathBuf> {
    let not_found = || CprError::NotFound(format!("paths_root not found: {paths_root}"));
    if paths_root.trim().is_empty() {
        return Err(CprError::InvalidArgument("paths_root is required".to_string()));
    }
    let root = std::fs::canonicalize(paths_root).map_err(|_| not_found())?;
    if !root.is_dir() {
        return Err(not_found());
    }
    Ok(root)
}

fn missing_artifact(entry: &CatalogEntry, message: String) -> PageItem {
    PageItem {
        kind: entry.kind,
        key: entry.key.clone(),
        data: None,
        error: Some(ErrorArtifact {
            key: entry.key.clone(),
            phase: entry.kind.as_str().to_string(),
            error_message: message,
        }),
    }
}

/// Owns the stores and analyzers; one instance serves many requests.
pub struct ParseService {
    settings: Settings,
    artifacts: Arc<dyn ArtifactStore>,
    runs: Arc<dyn RunStore>,
    analyzers: AnalyzerSet,
}

impl ParseService {
    pub fn new(
        settings: Settings,
        artifacts: Arc<dyn ArtifactStore>,
        runs: Arc<dyn RunStore>,
        analyzers: AnalyzerSet,
    ) -> Self {
        Self {
            settings,
            artifacts,
            runs,
            analyzers,
        }
    }

    /// Filesystem artifact cache, the configured run store and the Java
    /// bridges, all rooted at `settings.cache_dir`.
    pub fn from_settings(settings: Settings) -> CprResult<Self> {
        let layout = CacheLayout::new(&settings.cache_dir);
        let runs: Arc<dyn RunStore> = match settings.run_store {
            RunStoreBackend::Fs => Arc::new(FsRunStore::new(layout.clone())),
            RunStoreBackend::Sqlite => Arc::new(SqliteRunStore::open(
                settings.cache_dir.join(RUN_STORE_DB_NAME),
            )?),
        };
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(layout));
        let analyzers = AnalyzerSet::from_settings(&settings);
        Ok(Self::new(settings, artifacts, runs, analyzers))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn artifacts(&self) -> &dyn ArtifactStore {
        self.artifacts.as_ref()
    }

    pub fn runs(&self) -> &dyn RunStore {
        self.runs.as_ref()
    }

    fn load_or_build_index(&self, run_id: &str, root: &Path, resumed: bool) -> CprResult<SourceIndex> {
        let root_str = root.to_string_lossy();
        match self.runs.get_source_index(run_id)? {
            Some(index) => {
                if index.root != root_str {
                    return Err(CprError::InvalidArgument(format!(
                        "run {run_id} was indexed for {}, not {root_str}",
                        index.root
                    )));
                }
                tracing::debug!(run_id, files = index.files.len(), "source index reused");
                Ok(index)
            }
            None if resumed => Err(CprError::NotFound(format!(
                "no source index stored for run {run_id}"
            ))),
            None => {
                let index = build_source_index(root)?;
                self.runs.put_source_index(run_id, &index)?;
                Ok(index)
            }
        }
    }

    /// Serve one page of the analysis of `request.paths_root`.
    pub fn parse_repo(&self, request: &ParseRepoRequest) -> CprResult<ParseRepoResponse> {
        let root = resolve_root(&request.paths_root)?;

        let cursor = match request.cursor.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Some(decode_cursor(token)?),
            _ => None,
        };
        let explicit_kinds = request
            .kinds
            .as_deref()
            .map(ArtifactKind::parse_list)
            .transpose()?
            .map(|mut kinds| {
                kinds.sort();
                kinds
            });
        let explicit_run = request
            .run_id
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        if let Some(run_id) = explicit_run {
            validate_segment("run_id", run_id)?;
        }

        let (run_id, kinds) = match &cursor {
            Some(c) => {
                if let Some(run_id) = explicit_run {
                    if run_id != c.run_id {
                        return Err(CprError::InvalidCursor(format!(
                            "cursor belongs to run {}, not {run_id}",
                            c.run_id
                        )));
                    }
                }
                if let Some(kinds) = &explicit_kinds {
                    if *kinds != c.kinds {
                        return Err(CprError::InvalidCursor(
                            "kinds differ from the cursor's; restart without cursor".to_string(),
                        ));
                    }
                }
                (c.run_id.clone(), c.kinds.clone())
            }
            None => (
                explicit_run.map(str::to_string).unwrap_or_else(make_run_id),
                explicit_kinds.unwrap_or_else(|| ArtifactKind::ORDER.to_vec()),
            ),
        };

        // An explicit page size wins over the one carried by the cursor.
        let cursor_size = match &cursor {
            Some(c) => Some(i64::try_from(c.ps).map_err(|_| {
                CprError::InvalidCursor(format!("cursor page size out of range: {}", c.ps))
            })?),
            None => None,
        };
        let requested_size = request.page_size.or(cursor_size);
        let page_size = resolve_page_size(
            requested_size,
            self.settings.page_size,
            self.settings.max_page_size,
        )?;

        let index = self.load_or_build_index(&run_id, &root, cursor.is_some())?;
        let catalog = build_catalog(&index, &kinds);
        let total = catalog.len();
        let start = cursor.as_ref().map(|c| c.offset).unwrap_or(0).min(total);
        let end = (start + page_size).min(total);
        let page = &catalog[start..end];

        tracing::info!(
            run_id = %run_id,
            paths_root = %index.root,
            total,
            start,
            end,
            page_size,
            force_reparse = request.force_reparse,
            "parse_repo page"
        );

        let report = self.fill_page(&run_id, &root, page, request.force_reparse);
        tracing::debug!(
            cache_hits = report.cache_hits(),
            analyzed = report.analyzed(),
            failed = report.failed(),
            "page ready"
        );

        let counts = counts_per_kind(&index, &kinds);
        self.runs.put_manifest(&Manifest {
            run_id: run_id.clone(),
            paths_root: index.root.clone(),
            kinds: kinds.clone(),
            page_size,
            counts: counts.clone(),
        })?;

        let items = page
            .iter()
            .map(|entry| self.page_item(&run_id, &index, entry))
            .collect::<CprResult<Vec<_>>>()?;

        let next_cursor = if end < total {
            Some(encode_cursor(
                &Cursor::new(&run_id, kinds, page_size).advanced_to(end),
            )?)
        } else {
            None
        };

        Ok(ParseRepoResponse {
            run: RunInfo {
                run_id,
                paths_root: index.root.clone(),
            },
            meta: ResponseMeta { counts, page_size },
            items,
            next_cursor,
        })
    }

    fn fill_page(&self, run_id: &str, root: &Path, page: &[CatalogEntry], force: bool) -> PageFillReport {
        let ctx = FillContext {
            run_id,
            root,
            store: self.artifacts.as_ref(),
            analyzers: &self.analyzers,
            workers: self.settings.workers,
        };
        ensure_page(page, &ctx, force)
    }

    /// Page items are read back from the cache so every page reflects what
    /// is persisted.
    fn page_item(&self, run_id: &str, index: &SourceIndex, entry: &CatalogEntry) -> CprResult<PageItem> {
        if entry.kind.is_synthetic() {
            return Ok(PageItem {
                kind: entry.kind,
                key: entry.key.clone(),
                data: Some(serde_json::to_value(index)?),
                error: None,
            });
        }
        let sha256 = match entry.sha256.as_deref() {
            Some(sha) => sha,
            None => return Ok(missing_artifact(entry, "missing content fingerprint".to_string())),
        };
        let bytes = match self.artifacts.read(run_id, sha256, entry.kind) {
            Ok(bytes) => bytes,
            Err(CprError::NotFound(_)) => {
                return Ok(missing_artifact(entry, "artifact missing from cache".to_string()))
            }
            Err(err) => {
                tracing::warn!(run_id, relpath = %entry.key, error = %err, "cached artifact unreadable");
                return Ok(missing_artifact(entry, format!("cached artifact unreadable: {err}")));
            }
        };
        Ok(match Artifact::from_bytes(&bytes) {
            Ok(Artifact::Ok { data }) => PageItem {
                kind: entry.kind,
                key: entry.key.clone(),
                data: Some(data),
                error: None,
            },
            Ok(Artifact::Error(error)) => PageItem {
                kind: entry.kind,
                key: entry.key.clone(),
                data: None,
                error: Some(error),
            },
            Err(err) => missing_artifact(entry, format!("unreadable cached artifact: {err}")),
        })
    }
}
