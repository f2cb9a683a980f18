//! Ingestion pipeline: corpus -> fragments -> embeddings -> index.
//!
//! Per-document and per-batch failures are isolated and accumulated in the
//! run report; only non-transient service errors abort the run, and the first
//! such error is surfaced in the report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{EmbeddingError, VectorStoreError};
use crate::models::{Document, Fragment, IndexRecord};
use crate::services::embedding::EmbeddingClient;
use crate::services::preparer::TextPreparer;
use crate::services::vector_store::VectorStoreManager;

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents_loaded: usize,
    pub documents_skipped: usize,
    pub fragments_prepared: usize,
    pub fragments_indexed: usize,
    pub batches_failed: usize,
    /// Per-document and per-batch errors, in occurrence order.
    pub errors: Vec<String>,
    /// First fatal error, set when the run aborted early.
    pub fatal: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl IngestReport {
    pub fn succeeded(&self) -> bool {
        self.fatal.is_none()
    }
}

/// Wires the preparer, embedding client, and vector store manager together
/// for one ingestion run.
pub struct IngestPipeline<'a> {
    preparer: &'a TextPreparer,
    embedder: &'a EmbeddingClient,
    store: &'a VectorStoreManager,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(
        preparer: &'a TextPreparer,
        embedder: &'a EmbeddingClient,
        store: &'a VectorStoreManager,
    ) -> Self {
        Self {
            preparer,
            embedder,
            store,
        }
    }

    /// Ingest `documents`, reporting progress after each embed+upsert batch.
    pub async fn run<F>(&self, documents: &[Document], mut on_batch: F) -> IngestReport
    where
        F: FnMut(usize, usize),
    {
        let mut report = IngestReport {
            documents_loaded: documents.len(),
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        // Validation failures skip the document, never the run.
        let mut units: Vec<(Fragment, String)> = Vec::new();
        for document in documents {
            match self.preparer.prepare(document) {
                Ok(fragments) => {
                    for fragment in fragments {
                        units.push((fragment, document.reference.clone()));
                    }
                }
                Err(error) => {
                    report.documents_skipped += 1;
                    report.errors.push(error.to_string());
                }
            }
        }
        report.fragments_prepared = units.len();

        let batch_size = self.embedder.batch_size();
        let total_batches = units.len().div_ceil(batch_size);

        for (batch_index, batch) in units.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|(f, _)| f.text.clone()).collect();

            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) => vectors,
                Err(EmbeddingError::RateLimitExhausted { attempts, .. }) => {
                    report.batches_failed += 1;
                    report.errors.push(format!(
                        "batch {}/{}: embedding rate limit exhausted after {} attempts",
                        batch_index + 1,
                        total_batches,
                        attempts
                    ));
                    on_batch(batch_index + 1, total_batches);
                    continue;
                }
                Err(error) => {
                    report.fatal = Some(error.to_string());
                    return report;
                }
            };

            let records: Vec<IndexRecord> = batch
                .iter()
                .zip(vectors)
                .map(|((fragment, reference), values)| {
                    IndexRecord::from_fragment(fragment, reference, values)
                })
                .collect();

            match self.store.upsert(&records).await {
                Ok(()) => {
                    report.fragments_indexed += records.len();
                }
                Err(VectorStoreError::RateLimitExhausted { attempts, .. }) => {
                    report.batches_failed += 1;
                    report.errors.push(format!(
                        "batch {}/{}: upsert rate limit exhausted after {} attempts",
                        batch_index + 1,
                        total_batches,
                        attempts
                    ));
                }
                Err(error) => {
                    report.fatal = Some(error.to_string());
                    return report;
                }
            }

            on_batch(batch_index + 1, total_batches);
        }

        report
    }
}
