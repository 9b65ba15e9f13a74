//! Criterion benchmarks for cpr-core.
//!
//! ## Benchmark groups
//!
//! 1. **guards**: Page size resolution.
//! 2. **catalog**: Catalog construction at various repository sizes.
//! 3. **cursor**: Cursor encode/decode.
//! 4. **indexing**: Source index build over a temp directory.
//! 5. **page_fill**: Cold and warm page fills against the in-memory store.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/cpr-core/Cargo.toml
//! # Run only the catalog group:
//! cargo bench --manifest-path crates/cpr-core/Cargo.toml -- catalog
//! ```

use std::path::Path;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use cpr_core::analyzer::{AnalyzeInput, Analyzer, AnalyzerSet};
use cpr_core::cursor::{decode_cursor, encode_cursor, Cursor};
use cpr_core::errors::AnalyzerError;
use cpr_core::indexer::catalog::build_catalog;
use cpr_core::indexer::filesystem::build_source_index;
use cpr_core::indexer::pipeline::{ensure_page, FillContext};
use cpr_core::models::{ArtifactKind, FileKind, SourceFile, SourceIndex};
use cpr_core::query::guards::{clamp_int, resolve_page_size};
use cpr_core::store::cache::MemoryArtifactStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Synthetic index with `n` files split between programs, copybooks and
/// other files.
fn synthetic_index(n: usize) -> SourceIndex {
    let files = (0..n)
        .map(|i| {
            let relpath = match i % 3 {
                0 => format!("src/prog{i:05}.cbl"),
                1 => format!("copy/book{i:05}.cpy"),
                _ => format!("jcl/job{i:05}.jcl"),
            };
            SourceFile {
                kind: FileKind::from_relpath(&relpath),
                relpath,
                size_bytes: 1024,
                sha256: format!("{i:064x}"),
                language_hint: None,
                encoding: None,
                program_id_guess: None,
            }
        })
        .collect();
    SourceIndex {
        root: "/bench".to_string(),
        files,
    }
}

fn fake_analyzers() -> AnalyzerSet {
    let analyzer: Arc<dyn Analyzer> =
        Arc::new(|input: &AnalyzeInput| -> Result<Value, AnalyzerError> {
            Ok(json!({ "relpath": input.relpath, "sha256": input.sha256 }))
        });
    AnalyzerSet::new()
        .with(ArtifactKind::Copybook, analyzer.clone())
        .with(ArtifactKind::Program, analyzer)
}

// ---------------------------------------------------------------------------
// 1. Guards
// ---------------------------------------------------------------------------

fn bench_guards(c: &mut Criterion) {
    let mut group = c.benchmark_group("guards");

    group.bench_function("clamp_int", |b| {
        b.iter(|| clamp_int(black_box(150), black_box(1), black_box(100)));
    });

    group.bench_function("resolve_page_size_default", |b| {
        b.iter(|| resolve_page_size(black_box(None), black_box(100), black_box(500)));
    });

    group.bench_function("resolve_page_size_clamped", |b| {
        b.iter(|| resolve_page_size(black_box(Some(9000)), black_box(100), black_box(500)));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Catalog
// ---------------------------------------------------------------------------

fn bench_catalog(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");
    for scale in &[100usize, 1_000, 10_000] {
        let index = synthetic_index(*scale);
        group.bench_with_input(BenchmarkId::new("all_kinds", scale), &index, |b, index| {
            b.iter(|| build_catalog(black_box(index), &ArtifactKind::ORDER));
        });
        group.bench_with_input(BenchmarkId::new("programs_only", scale), &index, |b, index| {
            b.iter(|| build_catalog(black_box(index), &[ArtifactKind::Program]));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Cursor
// ---------------------------------------------------------------------------

fn bench_cursor(c: &mut Criterion) {
    let mut group = c.benchmark_group("cursor");
    let cursor = Cursor::new("cpr_20240101T000000000000Z", ArtifactKind::ORDER.to_vec(), 100)
        .advanced_to(4200);
    let token = encode_cursor(&cursor).unwrap();

    group.bench_function("encode", |b| {
        b.iter(|| encode_cursor(black_box(&cursor)).unwrap());
    });
    group.bench_function("decode", |b| {
        b.iter(|| decode_cursor(black_box(&token)).unwrap());
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// 4. Indexing
// ---------------------------------------------------------------------------

fn write_repo(root: &Path, n: usize) {
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("copy")).unwrap();
    for i in 0..n {
        if i % 2 == 0 {
            let body = format!(
                "       IDENTIFICATION DIVISION.\n       PROGRAM-ID. PROG{i:04}.\n{}",
                "       DISPLAY 'HELLO'.\n".repeat(50)
            );
            std::fs::write(root.join(format!("src/prog{i:04}.cbl")), body).unwrap();
        } else {
            let body = format!("       01 REC{i:04}.\n          05 FIELD PIC X(10).\n");
            std::fs::write(root.join(format!("copy/book{i:04}.cpy")), body).unwrap();
        }
    }
}

fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    group.sample_size(20);
    for scale in &[50usize, 500] {
        let dir = tempfile::tempdir().unwrap();
        write_repo(dir.path(), *scale);
        group.bench_with_input(
            BenchmarkId::new("build_source_index", scale),
            dir.path(),
            |b, root| {
                b.iter(|| build_source_index(black_box(root)).unwrap());
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 5. Page fill
// ---------------------------------------------------------------------------

fn bench_page_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_fill");
    let index = synthetic_index(300);
    let catalog = build_catalog(&index, &ArtifactKind::ORDER);
    let page = &catalog[..100usize.min(catalog.len())];
    let analyzers = fake_analyzers();

    group.bench_function("cold", |b| {
        b.iter(|| {
            let store = MemoryArtifactStore::new();
            let ctx = FillContext {
                run_id: "bench",
                root: Path::new("/bench"),
                store: &store,
                analyzers: &analyzers,
                workers: 4,
            };
            ensure_page(black_box(page), &ctx, false)
        });
    });

    let warm_store = MemoryArtifactStore::new();
    let warm_ctx = FillContext {
        run_id: "bench",
        root: Path::new("/bench"),
        store: &warm_store,
        analyzers: &analyzers,
        workers: 4,
    };
    ensure_page(page, &warm_ctx, false);
    group.bench_function("warm", |b| {
        b.iter(|| ensure_page(black_box(page), &warm_ctx, false));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_guards,
    bench_catalog,
    bench_cursor,
    bench_indexing,
    bench_page_fill,
);
criterion_main!(benches);
