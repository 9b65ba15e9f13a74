//! cpr core library: run-scoped, content-addressed analysis of COBOL
//! repositories with cursor pagination.
//!
//! A request ([`query::parse_repo::ParseService::parse_repo`]) indexes the
//! repository once per run, builds a deterministic catalog, and fills the
//! artifact cache one page at a time through pluggable analyzers. Pages can
//! be resumed across process restarts with the returned cursor.

pub mod analyzer;
pub mod cursor;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod settings;
pub mod store;

pub use errors::{AnalyzerError, CprError, CprResult};
pub use query::parse_repo::{ParseRepoRequest, ParseRepoResponse, ParseService};
pub use settings::Settings;
