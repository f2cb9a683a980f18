//! Retrieval and answer models.

use serde::{Deserialize, Serialize};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
    /// Documentation-friendly Markdown format
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// One nearest-neighbor match returned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMatch {
    /// Matching record id
    pub id: String,

    /// Similarity score under the index's configured metric
    pub score: f32,

    /// Source link stored with the record
    pub reference: String,

    /// Fragment text stored with the record
    pub text: String,
}

/// A grounded answer with its citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text
    pub text: String,

    /// Source references in citation order, each at most once
    pub sources: Vec<String>,

    /// True when retrieval found nothing and the answer is ungrounded
    pub no_context: bool,
}

impl Answer {
    /// Build an answer from generated text and the cited matches,
    /// deduplicating references while preserving citation order.
    ///
    /// `retrieved_any` reports whether retrieval found anything at all;
    /// citations can be empty even when it did, when the token budget
    /// dropped every excerpt.
    pub fn new(text: String, cited: &[RetrievalMatch], retrieved_any: bool) -> Self {
        let mut sources: Vec<String> = Vec::new();
        for m in cited {
            if !sources.contains(&m.reference) {
                sources.push(m.reference.clone());
            }
        }
        Self {
            text,
            sources,
            no_context: !retrieved_any,
        }
    }
}
