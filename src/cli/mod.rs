//! CLI module for sourcewise.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Retrieval-augmented question answering over a CSV knowledge corpus.
#[derive(Debug, Parser)]
#[command(name = "sourcewise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed a CSV corpus and load it into the vector index
    Ingest(commands::IngestArgs),

    /// Answer a question from the indexed corpus
    Ask(commands::AskArgs),

    /// Manage the vector index (create, delete, reset, stats)
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

// FromStr for OutputFormat is implemented in models::answer
