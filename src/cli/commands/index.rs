//! Index lifecycle command implementation.

use anyhow::Result;
use clap::Subcommand;

use crate::cli::output::{IndexStatus, get_formatter};
use crate::error::VectorStoreError;
use crate::models::{Config, OutputFormat};
use crate::services::VectorStoreManager;

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Create the index if it does not exist
    Create {
        /// Target a different index than the configured one
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete the index and all records in it
    Delete {
        /// Target a different index than the configured one
        #[arg(long)]
        name: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// Delete and recreate the index, clearing all records
    Reset {
        /// Target a different index than the configured one
        #[arg(long)]
        name: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// Show index configuration and record counts
    Stats {
        /// Target a different index than the configured one
        #[arg(long)]
        name: Option<String>,
    },
}

impl IndexCommand {
    fn name_override(&self) -> Option<&String> {
        match self {
            IndexCommand::Create { name }
            | IndexCommand::Delete { name, .. }
            | IndexCommand::Reset { name, .. }
            | IndexCommand::Stats { name } => name.as_ref(),
        }
    }
}

pub async fn handle_index(cmd: IndexCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    let formatter = get_formatter(format);

    if let Some(name) = cmd.name_override() {
        config.index.name = name.clone();
    }

    let store = VectorStoreManager::from_config(
        &config.index,
        config.embedding.dimension as usize,
        &config.retry,
        Config::pinecone_api_key()?,
    )?;

    match cmd {
        IndexCommand::Create { .. } => {
            if verbose {
                println!(
                    "Creating index '{}' (dimension {}, metric {})...",
                    store.name(),
                    store.dimension(),
                    config.index.metric
                );
            }
            store.create_index().await?;
            println!(
                "{}",
                formatter.format_message(&format!("Index '{}' is ready", store.name()))
            );
        }
        IndexCommand::Delete { force, .. } => {
            if !confirm(
                force,
                &format!(
                    "This will delete index '{}' and ALL records in it. Continue? [y/N]",
                    store.name()
                ),
            )? {
                println!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }
            store.delete_index().await?;
            println!(
                "{}",
                formatter.format_message(&format!("Index '{}' deleted", store.name()))
            );
        }
        IndexCommand::Reset { force, .. } => {
            if !confirm(
                force,
                &format!(
                    "This will delete and recreate index '{}', clearing all records. Continue? [y/N]",
                    store.name()
                ),
            )? {
                println!("{}", formatter.format_message("Cancelled."));
                return Ok(());
            }
            store.reset_index().await?;
            println!(
                "{}",
                formatter.format_message(&format!("Index '{}' reset and ready", store.name()))
            );
        }
        IndexCommand::Stats { .. } => {
            let description = store.describe_index().await?;
            let stats = match description {
                Some(_) => match store.stats().await {
                    Ok(stats) => Some(stats),
                    Err(VectorStoreError::IndexNotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                },
                None => None,
            };
            print!(
                "{}",
                formatter.format_index_status(&IndexStatus {
                    name: store.name().to_string(),
                    description,
                    stats,
                })
            );
        }
    }

    Ok(())
}

fn confirm(force: bool, prompt: &str) -> Result<bool> {
    if force {
        return Ok(true);
    }
    println!("{}", prompt);
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
