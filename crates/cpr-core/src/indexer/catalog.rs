//! Deterministic catalog construction from a source index.
//!
//! The catalog is the pagination contract: artifact kinds in priority order,
//! and within each kind, files sorted by relpath (byte-wise). Changing this
//! ordering requires bumping [`ORDER_SCHEME_ID`](crate::models::ORDER_SCHEME_ID).

use crate::errors::CprResult;
use crate::models::{ArtifactKind, Catalog, CatalogEntry, SourceIndex, SOURCE_INDEX_KEY};

/// Build the catalog for the requested kind names.
///
/// Fails with `InvalidArgument` when a name is outside the artifact kind enum.
pub fn build_catalog_for_names(index: &SourceIndex, kind_names: &[String]) -> CprResult<Catalog> {
    let kinds = ArtifactKind::parse_list(kind_names)?;
    Ok(build_catalog(index, &kinds))
}

pub fn build_catalog(index: &SourceIndex, kinds: &[ArtifactKind]) -> Catalog {
    let mut catalog = Vec::new();
    for kind in ArtifactKind::ORDER {
        if !kinds.contains(&kind) {
            continue;
        }
        let file_kind = match kind.source_file_kind() {
            None => {
                catalog.push(CatalogEntry {
                    kind,
                    key: SOURCE_INDEX_KEY.to_string(),
                    sha256: None,
                });
                continue;
            }
            Some(fk) => fk,
        };
        let mut selected: Vec<_> = index.files.iter().filter(|f| f.kind == file_kind).collect();
        selected.sort_by(|a, b| a.relpath.as_bytes().cmp(b.relpath.as_bytes()));
        catalog.extend(selected.into_iter().map(|f| CatalogEntry {
            kind,
            key: f.relpath.clone(),
            sha256: Some(f.sha256.clone()),
        }));
    }
    catalog
}
