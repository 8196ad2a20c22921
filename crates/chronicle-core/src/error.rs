//! Error types for chronicle-core operations.
//!
//! `classify()` is the single place that decides whether a failure is
//! retryable, rather than scattering that judgment across call sites.

// ─────────────────────────────────────────────────────────────────────────
// Error kinds
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ChronicleError {
    #[error("failed to parse hook input: {0}")]
    Parse(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend authentication failed: {backend}: {details}")]
    Auth { backend: &'static str, details: String },

    #[error("transient backend error: {backend}: {details}")]
    TransientBackend {
        backend: &'static str,
        details: String,
    },

    #[error("permanent backend error: {backend}: {details}")]
    PermanentBackend {
        backend: &'static str,
        details: String,
    },

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Whether a persistence-layer error should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
}

impl ChronicleError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ChronicleError::TransientBackend { .. } | ChronicleError::Timeout(_) => {
                ErrorClass::Retryable
            }
            ChronicleError::Auth { .. } | ChronicleError::PermanentBackend { .. } => {
                ErrorClass::NonRetryable
            }
            ChronicleError::Parse(_)
            | ChronicleError::Validation(_)
            | ChronicleError::Config(_)
            | ChronicleError::Internal(_)
            | ChronicleError::Io { .. }
            | ChronicleError::Json { .. } => ErrorClass::NonRetryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classify() == ErrorClass::Retryable
    }
}

/// Convenience type alias for Results using ChronicleError.
pub type Result<T> = std::result::Result<T, ChronicleError>;

// Conversion for string error compatibility, matching how callers at the
// hook boundary collapse every error to a logged string.
impl From<ChronicleError> for String {
    fn from(err: ChronicleError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_backend_errors_are_retryable() {
        let err = ChronicleError::TransientBackend {
            backend: "primary",
            details: "timeout".into(),
        };
        assert_eq!(err.classify(), ErrorClass::Retryable);
        assert!(err.is_retryable());
    }

    #[test]
    fn auth_errors_are_never_retried() {
        let err = ChronicleError::Auth {
            backend: "primary",
            details: "invalid key".into(),
        };
        assert_eq!(err.classify(), ErrorClass::NonRetryable);
    }

    #[test]
    fn schema_errors_are_non_retryable() {
        let err = ChronicleError::PermanentBackend {
            backend: "primary",
            details: "column does not exist".into(),
        };
        assert_eq!(err.classify(), ErrorClass::NonRetryable);
    }
}
