pub mod embedding;
pub mod generator;
pub mod pacing;
pub mod pipeline;
pub mod preparer;
pub mod vector_store;

pub use embedding::{EmbeddingBackend, EmbeddingClient, OpenAiEmbeddings};
pub use generator::{CompletionBackend, OpenAiChat, PromptRole, RetrievalAugmentedGenerator};
pub use pacing::PacingState;
pub use pipeline::{IngestPipeline, IngestReport};
pub use preparer::TextPreparer;
pub use vector_store::{
    IndexDescription, IndexStats, PineconeIndex, VectorIndex, VectorStoreManager,
};
