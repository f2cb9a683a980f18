//! CSV corpus loader.
//!
//! Expects a header row with `id`, `tiny_link`, and `content` columns. Rows
//! with a missing or empty `id` or `tiny_link` are skipped and reported; rows
//! past the configured cap are ignored.

use std::path::Path;

use serde::Deserialize;

use crate::error::CorpusError;
use crate::models::Document;

#[derive(Debug, Deserialize)]
struct CorpusRow {
    id: Option<String>,
    tiny_link: Option<String>,
    content: Option<String>,
}

/// Result of loading a corpus file: the usable documents plus per-row skips.
#[derive(Debug)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub skip_reasons: Vec<String>,
}

/// Reads documents from a CSV export.
pub struct CorpusLoader {
    max_rows: usize,
}

impl CorpusLoader {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn load(&self, path: &Path) -> Result<Corpus, CorpusError> {
        let mut reader = csv::Reader::from_path(path)?;

        let mut corpus = Corpus {
            documents: Vec::new(),
            rows_read: 0,
            rows_skipped: 0,
            skip_reasons: Vec::new(),
        };

        for (index, result) in reader.deserialize::<CorpusRow>().enumerate() {
            if corpus.rows_read >= self.max_rows {
                break;
            }
            corpus.rows_read += 1;

            // Header is line 1, so data rows start at line 2.
            let line = index + 2;
            let row = match result {
                Ok(row) => row,
                Err(error) => {
                    corpus.rows_skipped += 1;
                    corpus.skip_reasons.push(format!("row {line}: {error}"));
                    continue;
                }
            };

            let Some(id) = row.id.filter(|v| !v.trim().is_empty()) else {
                corpus.rows_skipped += 1;
                corpus
                    .skip_reasons
                    .push(CorpusError::MissingField { row: line, field: "id" }.to_string());
                continue;
            };
            let Some(reference) = row.tiny_link.filter(|v| !v.trim().is_empty()) else {
                corpus.rows_skipped += 1;
                corpus.skip_reasons.push(
                    CorpusError::MissingField {
                        row: line,
                        field: "tiny_link",
                    }
                    .to_string(),
                );
                continue;
            };

            corpus.documents.push(Document {
                id,
                reference,
                text: row.content.unwrap_or_default(),
            });
        }

        if corpus.rows_read == 0 {
            return Err(CorpusError::Empty);
        }

        Ok(corpus)
    }
}
