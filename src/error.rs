//! Error types for the sourcewise pipeline.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to corpus loading and record validation.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("row {row}: missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },

    #[error("no documents found in corpus")]
    Empty,
}

/// A malformed or unusable document; skipped and reported, never fatal to a run.
#[derive(Debug, Error)]
#[error("document '{id}': {reason}")]
pub struct ValidationError {
    pub id: String,
    pub reason: String,
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("rate limited by embedding service{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted {
        attempts: u32,
        /// Vectors completed for chunks that succeeded before the abort.
        completed: Vec<Vec<f32>>,
    },

    #[error("embedding request timed out")]
    Timeout,

    #[error("failed to reach embedding service: {0}")]
    Connection(String),

    #[error("embedding service rejected credentials: {0}")]
    Auth(String),

    #[error("embedding service error: {0}")]
    Api(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimited { .. }
                | EmbeddingError::Timeout
                | EmbeddingError::Connection(_)
        )
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("index '{0}' does not exist")]
    IndexNotFound(String),

    #[error(
        "index '{name}' already exists with dimension {existing_dimension} / metric '{existing_metric}' \
         (requested dimension {requested_dimension} / metric '{requested_metric}')"
    )]
    IndexConflict {
        name: String,
        existing_dimension: usize,
        existing_metric: String,
        requested_dimension: usize,
        requested_metric: String,
    },

    #[error("vector has dimension {actual} but index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("rate limited by vector store{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("rate limit retries exhausted after {attempts} attempts ({batches_completed} batches upserted)")]
    RateLimitExhausted {
        attempts: u32,
        batches_completed: usize,
    },

    #[error("vector store request timed out")]
    Timeout,

    #[error("failed to reach vector store: {0}")]
    Connection(String),

    #[error("vector store rejected credentials: {0}")]
    Auth(String),

    #[error("vector store error: {0}")]
    Api(String),

    #[error("invalid vector store response: {0}")]
    InvalidResponse(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            VectorStoreError::RateLimited { .. }
                | VectorStoreError::Timeout
                | VectorStoreError::Connection(_)
        )
    }
}

/// Errors related to chat completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("rate limited by completion service{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("completion request timed out")]
    Timeout,

    #[error("failed to reach completion service: {0}")]
    Connection(String),

    #[error("completion service rejected credentials: {0}")]
    Auth(String),

    #[error("completion service error: {0}")]
    Api(String),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

impl Retryable for CompletionError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited { .. }
                | CompletionError::Timeout
                | CompletionError::Connection(_)
        )
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to ingestion runs.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Errors related to answering a query.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("ask error: {0}")]
    Ask(#[from] AskError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_retryable() {
        assert!(EmbeddingError::RateLimited { retry_after: None }.is_retryable());
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(
            VectorStoreError::RateLimited {
                retry_after: Some(2)
            }
            .is_retryable()
        );
        assert!(CompletionError::Connection("refused".into()).is_retryable());
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!EmbeddingError::Auth("bad key".into()).is_retryable());
        assert!(!EmbeddingError::InvalidResponse("garbage".into()).is_retryable());
        assert!(
            !VectorStoreError::DimensionMismatch {
                expected: 768,
                actual: 512
            }
            .is_retryable()
        );
        assert!(!CompletionError::Api("400 bad request".into()).is_retryable());
    }
}
