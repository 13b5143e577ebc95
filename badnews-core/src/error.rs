//! Error types shared across the aggregator.

use std::sync::LazyLock;

use regex::Regex;

/// Result type alias for badnews operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error message the classifier backends emit when their store is briefly
/// contended. Callers back off and retry on this exact text.
pub const ERR_MODEL_BUSY: &str = "resource temporarily unavailable";

/// Storage errors matched by this pattern are transient and worth a retry.
static TRANSIENT_STORAGE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)database is (?:locked|busy)").unwrap()
});

/// Error types for the badnews aggregator
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid savepoint: {0}")]
    InvalidSavepoint(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid pattern: {0}")]
    BadPattern(String),

    #[error("transaction in progress")]
    TxInProgress,

    #[error("no transaction in progress")]
    NoTxInProgress,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for storage errors caused by a momentarily locked or busy
    /// database file. These are retried locally and never surfaced.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(msg) => TRANSIENT_STORAGE.is_match(msg),
            _ => false,
        }
    }

    /// True for the classifier stores' contention error, which is backed
    /// off and retried rather than propagated.
    pub fn is_transient_model(&self) -> bool {
        match self {
            Error::Model(msg) => msg == ERR_MODEL_BUSY,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_storage_matches_case_insensitively() {
        assert!(Error::Storage("database is locked".into()).is_transient());
        assert!(Error::Storage("Database is Busy".into()).is_transient());
        assert!(Error::Storage("step failed: DATABASE IS LOCKED (5)".into()).is_transient());
        assert!(!Error::Storage("UNIQUE constraint failed: feed.url".into()).is_transient());
        assert!(!Error::Model("database is locked".into()).is_transient());
    }

    #[test]
    fn transient_model_requires_exact_message() {
        assert!(Error::Model(ERR_MODEL_BUSY.into()).is_transient_model());
        assert!(!Error::Model("resource exhausted".into()).is_transient_model());
        assert!(!Error::Storage(ERR_MODEL_BUSY.into()).is_transient_model());
    }
}
