//! Ingest command implementation.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{EmbeddingClient, IngestPipeline, TextPreparer, VectorStoreManager};
use crate::sources::CorpusLoader;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Path to the corpus CSV (id, tiny_link, content columns)
    #[arg(required = true)]
    pub path: PathBuf,

    /// Override the configured row cap
    #[arg(long)]
    pub max_rows: Option<usize>,

    /// Override the configured embedding batch size
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Parse and validate the corpus without embedding or indexing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_ingest(args: IngestArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    if let Some(batch_size) = args.batch_size {
        config.embedding.batch_size = batch_size.max(1);
    }
    let max_rows = args.max_rows.unwrap_or(config.ingestion.max_rows);
    let corpus = CorpusLoader::new(max_rows)
        .load(&args.path)
        .with_context(|| format!("failed to load corpus from {}", args.path.display()))?;

    if verbose {
        println!(
            "Read {} rows ({} skipped, {} usable)",
            corpus.rows_read,
            corpus.rows_skipped,
            corpus.documents.len()
        );
        for reason in &corpus.skip_reasons {
            eprintln!("  {}", console::style(reason).yellow());
        }
    }

    if args.dry_run {
        println!(
            "{}",
            formatter.format_message(&format!(
                "Dry run: would ingest {} documents ({} rows skipped)",
                corpus.documents.len(),
                corpus.rows_skipped
            ))
        );
        return Ok(());
    }

    let embedder = EmbeddingClient::from_config(
        &config.embedding,
        &config.retry,
        Config::openai_api_key()?,
    )?;
    let store = VectorStoreManager::from_config(
        &config.index,
        config.embedding.dimension as usize,
        &config.retry,
        Config::pinecone_api_key()?,
    )?;

    if verbose {
        println!("Ensuring index '{}' exists...", store.name());
    }
    store.create_index().await?;

    let preparer = TextPreparer::new(&config.ingestion);
    let pipeline = IngestPipeline::new(&preparer, &embedder, &store);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches",
            )
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut report = pipeline
        .run(&corpus.documents, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await;
    pb.finish_and_clear();

    // Fold row-level skips into the run report so one summary covers both.
    report.documents_skipped += corpus.rows_skipped;
    report.errors.splice(0..0, corpus.skip_reasons);
    report.duration_ms = start_time.elapsed().as_millis() as u64;

    print!("{}", formatter.format_ingest_report(&report));

    if let Some(fatal) = report.fatal {
        anyhow::bail!("ingestion aborted: {}", fatal);
    }
    Ok(())
}
