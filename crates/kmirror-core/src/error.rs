//! Error types for kmirror.

use thiserror::Error;

/// Top-level result type for kmirror operations.
pub type Result<T> = std::result::Result<T, KmError>;

/// Top-level error type for kmirror.
#[derive(Debug, Error)]
pub enum KmError {
    #[error("vault not found: {0}")]
    VaultNotFound(String),

    #[error("knowledge not found: {0}")]
    KnowledgeNotFound(String),

    #[error("sync already running for vault {0}")]
    SyncInProgress(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("id error: {0}")]
    Id(#[from] IdError),

    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised while talking to the search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("task {task_uid} failed: {message}")]
    TaskFailed { task_uid: u64, message: String },

    #[error("task {task_uid} did not finish within {waited_ms}ms")]
    Timeout { task_uid: u64, waited_ms: u64 },

    #[error("search backend unreachable: {0}")]
    Unreachable(String),

    #[error("search backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode search backend response: {0}")]
    Decode(String),

    #[error("waiting for task {0} was cancelled")]
    Cancelled(u64),

    #[error("unsupported by this backend: {0}")]
    Unsupported(String),
}

/// Errors from the identifier service.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("random source failed: {0}")]
    Rng(String),

    #[error("monotonic randomness exhausted within one millisecond")]
    Overflow,

    #[error("invalid id '{value}': {reason}")]
    Invalid { value: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_human_readable_messages() {
        let err = KmError::VaultNotFound("vault-1".to_string());
        assert!(err.to_string().contains("vault-1"));

        let err = SearchError::TaskFailed {
            task_uid: 42,
            message: "index_primary_key_already_exists".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("index_primary_key_already_exists"));
    }

    #[test]
    fn search_errors_convert_into_top_level() {
        let err: KmError = SearchError::IndexNotFound("knowledge".to_string()).into();
        assert!(matches!(err, KmError::Search(SearchError::IndexNotFound(_))));
    }
}
