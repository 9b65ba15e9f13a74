//! Error types for the cpr core library.

/// Top-level error enum for request-level failures.
///
/// Per-item analyzer failures never surface here; they are recorded as
/// error artifacts by the orchestrator (see [`AnalyzerError`]).
#[derive(Debug, thiserror::Error)]
pub enum CprError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CprError {
    /// True for errors caused by the shape of the request rather than by
    /// the environment (storage, filesystem).
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            CprError::InvalidArgument(_)
                | CprError::NotFound(_)
                | CprError::InvalidCursor(_)
                | CprError::PermissionDenied(_)
        )
    }
}

pub type CprResult<T> = Result<T, CprError>;

/// Failure of a single external analyzer invocation.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("{0}")]
    NotConfigured(String),

    #[error("{tool} spawn failed: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} timeout after {elapsed_secs:.2}s")]
    Timeout { tool: String, elapsed_secs: f64 },

    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    InvalidOutput(String),
}

impl AnalyzerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AnalyzerError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_are_classified() {
        assert!(CprError::InvalidCursor("bad".into()).is_request_error());
        assert!(CprError::NotFound("run".into()).is_request_error());
        let io = CprError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!io.is_request_error());
    }

    #[test]
    fn test_timeout_display() {
        let err = AnalyzerError::Timeout {
            tool: "ProLeap".to_string(),
            elapsed_secs: 61.5,
        };
        assert_eq!(err.to_string(), "ProLeap timeout after 61.50s");
        assert!(err.is_timeout());
    }
}
