//! Page fill orchestration with Rayon-based parallelism.
//!
//! Every non-synthetic entry of a page ends with a cached artifact, either a
//! normalized result or an error record. A single entry's failure never fails
//! the page.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;

use crate::analyzer::{AnalyzeInput, AnalyzerSet};
use crate::errors::AnalyzerError;
use crate::models::{Artifact, ArtifactKind, CatalogEntry, ErrorArtifact};
use crate::store::cache::ArtifactStore;

/// Everything a page fill needs besides the page itself.
pub struct FillContext<'a> {
    pub run_id: &'a str,
    pub root: &'a Path,
    pub store: &'a dyn ArtifactStore,
    pub analyzers: &'a AnalyzerSet,
    pub workers: usize,
}

/// Lifecycle of one catalog entry during a fill.
///
/// `Pending -> Done` on a cache hit, otherwise `Pending -> Running -> Done`
/// or `Pending -> Running -> Failed`. `Failed` still leaves an error artifact
/// in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryOutcome {
    pub kind: ArtifactKind,
    pub key: String,
    pub state: EntryState,
    pub cache_hit: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageFillReport {
    pub outcomes: Vec<EntryOutcome>,
    pub elapsed_ms: u64,
}

impl PageFillReport {
    pub fn cache_hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cache_hit).count()
    }

    pub fn analyzed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.cache_hit && o.state == EntryState::Done)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == EntryState::Failed)
            .count()
    }
}

struct WorkUnit<'e> {
    entry: &'e CatalogEntry,
    sha256: &'e str,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "analyzer panicked".to_string()
    }
}

fn analyze_entry(ctx: &FillContext<'_>, unit: &WorkUnit<'_>) -> Result<serde_json::Value, AnalyzerError> {
    let kind = unit.entry.kind;
    let analyzer = ctx.analyzers.for_kind(kind).ok_or_else(|| {
        AnalyzerError::NotConfigured(format!("no analyzer registered for kind {kind}"))
    })?;
    let input = AnalyzeInput {
        path: ctx.root.join(&unit.entry.key),
        relpath: unit.entry.key.clone(),
        sha256: unit.sha256.to_string(),
    };
    match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&input))) {
        Ok(result) => result,
        Err(payload) => Err(AnalyzerError::Failed(panic_message(payload.as_ref()))),
    }
}

fn fill_entry(ctx: &FillContext<'_>, unit: &WorkUnit<'_>) -> EntryOutcome {
    let entry = unit.entry;
    let started = Instant::now();
    let (artifact, state) = match analyze_entry(ctx, unit) {
        Ok(data) => (Artifact::Ok { data }, EntryState::Done),
        Err(err) => {
            tracing::warn!(
                run_id = ctx.run_id,
                relpath = %entry.key,
                kind = %entry.kind,
                timeout = err.is_timeout(),
                error = %err,
                "analysis failed"
            );
            (
                Artifact::Error(ErrorArtifact {
                    key: entry.key.clone(),
                    phase: entry.kind.as_str().to_string(),
                    error_message: err.to_string(),
                }),
                EntryState::Failed,
            )
        }
    };

    let written = artifact
        .to_bytes()
        .and_then(|bytes| ctx.store.write(ctx.run_id, unit.sha256, entry.kind, &bytes));
    if let Err(err) = written {
        tracing::error!(
            run_id = ctx.run_id,
            relpath = %entry.key,
            error = %err,
            "failed to cache artifact"
        );
    }
    tracing::debug!(
        relpath = %entry.key,
        kind = %entry.kind,
        state = ?state,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "entry filled"
    );
    EntryOutcome {
        kind: entry.kind,
        key: entry.key.clone(),
        state,
        cache_hit: false,
    }
}

fn run_units(ctx: &FillContext<'_>, units: &[WorkUnit<'_>]) -> Vec<EntryOutcome> {
    if units.is_empty() {
        return vec![];
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.workers.max(1))
        .build();
    match pool {
        Ok(pool) => pool.install(|| units.par_iter().map(|u| fill_entry(ctx, u)).collect()),
        Err(err) => {
            tracing::warn!(error = %err, "worker pool unavailable, filling sequentially");
            units.iter().map(|u| fill_entry(ctx, u)).collect()
        }
    }
}

/// Make sure every non-synthetic entry in `page` has a cached artifact.
///
/// Cache hits are skipped unless `force_refresh` is set. Entries sharing a
/// `(sha256, kind)` slot are analyzed once. Blocks until every scheduled unit
/// has finished.
pub fn ensure_page(page: &[CatalogEntry], ctx: &FillContext<'_>, force_refresh: bool) -> PageFillReport {
    let started = Instant::now();
    let mut outcomes = Vec::with_capacity(page.len());
    let mut units = Vec::new();
    let mut scheduled: HashMap<(&str, ArtifactKind), &str> = HashMap::new();
    let mut duplicates: Vec<(usize, &str)> = Vec::new();

    for entry in page {
        if entry.kind.is_synthetic() {
            continue;
        }
        let sha256 = match entry.sha256.as_deref() {
            Some(sha) => sha,
            None => {
                tracing::warn!(key = %entry.key, "catalog entry without fingerprint skipped");
                continue;
            }
        };
        if let Some(first_key) = scheduled.get(&(sha256, entry.kind)) {
            duplicates.push((outcomes.len(), *first_key));
            outcomes.push(EntryOutcome {
                kind: entry.kind,
                key: entry.key.clone(),
                state: EntryState::Pending,
                cache_hit: true,
            });
            continue;
        }
        scheduled.insert((sha256, entry.kind), entry.key.as_str());
        let cached = !force_refresh
            && ctx
                .store
                .exists(ctx.run_id, sha256, entry.kind)
                .unwrap_or_else(|err| {
                    tracing::warn!(
                        run_id = ctx.run_id,
                        relpath = %entry.key,
                        error = %err,
                        "cache lookup failed, treating as miss"
                    );
                    false
                });
        if cached {
            outcomes.push(EntryOutcome {
                kind: entry.kind,
                key: entry.key.clone(),
                state: EntryState::Done,
                cache_hit: true,
            });
        } else {
            units.push(WorkUnit { entry, sha256 });
        }
    }

    tracing::debug!(
        run_id = ctx.run_id,
        scheduled = units.len(),
        workers = ctx.workers,
        "filling page"
    );
    outcomes.extend(run_units(ctx, &units));

    // Slot duplicates share the outcome of their first occurrence.
    for (idx, first_key) in duplicates {
        let kind = outcomes[idx].kind;
        let state = outcomes
            .iter()
            .find(|o| o.key == first_key && o.kind == kind && o.state != EntryState::Pending)
            .map(|o| o.state)
            .unwrap_or(EntryState::Done);
        outcomes[idx].state = state;
    }

    let report = PageFillReport {
        outcomes,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        run_id = ctx.run_id,
        page_entries = page.len(),
        cache_hits = report.cache_hits(),
        analyzed = report.analyzed(),
        failed = report.failed(),
        elapsed_ms = report.elapsed_ms,
        "page filled"
    );
    report
}
