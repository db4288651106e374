//! Error types for utilization sources.

use thiserror::Error;

/// Result type alias for utilization source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors a utilization source can surface to the HTTP layer.
///
/// Every variant maps to a flat `{"error": "<message>"}` body; the local
/// sampler never produces one of these (it is fail-soft).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read credentials from {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("upstream returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("upstream timed out after {0}s")]
    Timeout(u64),

    #[error("failed to parse upstream response: {0}")]
    Parse(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("{0} source does not report pod counts")]
    Unsupported(&'static str),
}

impl SourceError {
    /// Whether the error means "this source has no such view" rather
    /// than "the dependency failed".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, SourceError::Unsupported(_))
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_names_path() {
        let err = SourceError::Status {
            status: 403,
            path: "/api/v1/nodes".to_string(),
        };
        assert_eq!(err.to_string(), "upstream returned status 403 for /api/v1/nodes");
    }

    #[test]
    fn unsupported_is_flagged() {
        assert!(SourceError::Unsupported("local").is_unsupported());
        assert!(!SourceError::Timeout(5).is_unsupported());
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err: SourceError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
