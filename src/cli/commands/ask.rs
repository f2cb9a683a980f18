//! Ask command implementation.

use std::time::Instant;

use anyhow::Result;
use clap::Args;

use crate::cli::output::{AnswerView, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::generator::OpenAiChat;
use crate::services::{
    EmbeddingClient, PromptRole, RetrievalAugmentedGenerator, VectorStoreManager,
};

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Question to answer from the indexed corpus
    #[arg(required = true)]
    pub query: String,

    /// Number of excerpts to retrieve
    #[arg(long, short = 'k')]
    pub top_k: Option<u32>,

    /// Persona: customer_service, technical_support, or general_assistant
    #[arg(long)]
    pub role: Option<PromptRole>,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    if let Some(role) = args.role {
        config.completion.role = role;
    }
    let top_k = args.top_k.unwrap_or(config.query.top_k);

    let openai_key = Config::openai_api_key()?;
    let embedder =
        EmbeddingClient::from_config(&config.embedding, &config.retry, openai_key.clone())?;
    let store = VectorStoreManager::from_config(
        &config.index,
        config.embedding.dimension as usize,
        &config.retry,
        Config::pinecone_api_key()?,
    )?;
    let completion = OpenAiChat::new(&config.completion, openai_key)?;

    if verbose {
        println!(
            "Querying index '{}' (top_k={}, role={:?})",
            store.name(),
            top_k,
            config.completion.role
        );
    }

    let generator = RetrievalAugmentedGenerator::new(
        embedder,
        store,
        Box::new(completion),
        config.completion.clone(),
        config.retry.to_retry_config(),
    );

    let answer = generator.answer(&args.query, top_k).await?;

    let view = AnswerView {
        query: args.query,
        answer,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_answer(&view));

    Ok(())
}
