use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by the migration store and its table backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying Redis command failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A row or request payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row or a proposed migration does not have the expected shape.
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    /// Update targeted a row that does not exist.
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// Invalid input supplied to a store or helper operation.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Failure reported by a non-Redis table backend.
    #[error("backend error: {message}")]
    Backend { message: Cow<'static, str> },

    /// Configuration could not be read or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl StoreError {
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = StoreError::NotFound { id: "abc".into() };
        assert_eq!(err.to_string(), "record not found: abc");

        let err = StoreError::invalid_record("missing title");
        assert_eq!(err.to_string(), "invalid record: missing title");

        let err = StoreError::Backend {
            message: Cow::Borrowed("boom"),
        };
        assert_eq!(err.to_string(), "backend error: boom");
    }
}
