//! sourcewise: retrieval-augmented question answering over a CSV corpus.
//!
//! The pipeline loads documents from a CSV export, prepares and embeds them,
//! stages the vectors into a Pinecone index, and answers questions by
//! retrieving the closest excerpts and prompting a completion model with them.

pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod sources;
pub mod utils;

pub use error::AppError;
pub use models::{Answer, Config, Document, Fragment, IndexRecord, OutputFormat, RetrievalMatch};
pub use services::{
    EmbeddingClient, IngestPipeline, IngestReport, PromptRole, RetrievalAugmentedGenerator,
    TextPreparer, VectorStoreManager,
};
pub use sources::{Corpus, CorpusLoader};
