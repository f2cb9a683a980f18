mod answer;
mod config;
mod document;

pub use answer::{Answer, OutputFormat, RetrievalMatch};
pub use config::{
    CompletionConfig, Config, DEFAULT_COMPLETION_MODEL, DEFAULT_CONTROL_PLANE_URL,
    DEFAULT_EMBEDDING_API_BASE, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_INDEX_NAME, EmbeddingConfig, IndexConfig, IngestionConfig, QueryConfig,
    RetryPolicyConfig,
};
pub use document::{Document, Fragment, IndexRecord, RecordMetadata};
