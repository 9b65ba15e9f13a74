//! External analyzer boundary.
//!
//! The core only sees [`Analyzer`]: given a file, produce a structured JSON
//! result or fail. Subprocess handling and output-shape normalization live in
//! the bridge adapters.

pub mod bridges;
pub mod normalize;
pub mod runner;
pub mod xml_tree;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::AnalyzerError;
use crate::models::ArtifactKind;
use crate::settings::Settings;

/// One file handed to an analyzer.
#[derive(Clone, Debug)]
pub struct AnalyzeInput {
    /// Absolute path of the file on disk.
    pub path: PathBuf,
    pub relpath: String,
    pub sha256: String,
}

pub trait Analyzer: Send + Sync {
    fn analyze(&self, input: &AnalyzeInput) -> Result<Value, AnalyzerError>;
}

impl<F> Analyzer for F
where
    F: Fn(&AnalyzeInput) -> Result<Value, AnalyzerError> + Send + Sync,
{
    fn analyze(&self, input: &AnalyzeInput) -> Result<Value, AnalyzerError> {
        self(input)
    }
}

/// Analyzer adapters keyed by artifact kind.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    copybook: Option<Arc<dyn Analyzer>>,
    program: Option<Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Java bridges configured from settings: cb2xml for copybooks and
    /// ProLeap for programs.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new()
            .with(
                ArtifactKind::Copybook,
                Arc::new(bridges::CopybookBridge::new(settings)),
            )
            .with(
                ArtifactKind::Program,
                Arc::new(bridges::ProgramBridge::new(settings)),
            )
    }

    /// Register `analyzer` for `kind`. Registering the synthetic kind is a
    /// no-op since it is never analyzed.
    pub fn with(mut self, kind: ArtifactKind, analyzer: Arc<dyn Analyzer>) -> Self {
        match kind {
            ArtifactKind::SourceIndex => {}
            ArtifactKind::Copybook => self.copybook = Some(analyzer),
            ArtifactKind::Program => self.program = Some(analyzer),
        }
        self
    }

    pub fn for_kind(&self, kind: ArtifactKind) -> Option<&dyn Analyzer> {
        match kind {
            ArtifactKind::SourceIndex => None,
            ArtifactKind::Copybook => self.copybook.as_deref(),
            ArtifactKind::Program => self.program.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_kind() {
        let set = AnalyzerSet::new().with(
            ArtifactKind::Program,
            Arc::new(|input: &AnalyzeInput| -> Result<Value, AnalyzerError> {
                Ok(serde_json::json!({ "relpath": input.relpath }))
            }),
        );
        let input = AnalyzeInput {
            path: PathBuf::from("/r/a.cbl"),
            relpath: "a.cbl".to_string(),
            sha256: "00".to_string(),
        };
        let program = set.for_kind(ArtifactKind::Program).unwrap();
        assert_eq!(program.analyze(&input).unwrap()["relpath"], "a.cbl");
        assert!(set.for_kind(ArtifactKind::Copybook).is_none());
        assert!(set.for_kind(ArtifactKind::SourceIndex).is_none());
    }
}
