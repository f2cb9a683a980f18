//! Vector index abstraction and lifecycle management.
//!
//! `VectorIndex` is one raw round-trip to the store; `VectorStoreManager`
//! layers idempotent index lifecycle, batched upsert with the shared backoff
//! policy, and dimension prechecks on top of any backend.

#[cfg(test)]
pub(crate) mod memory;
mod pinecone;

pub use pinecone::PineconeIndex;

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::VectorStoreError;
use crate::models::{IndexConfig, IndexRecord, RetrievalMatch, RetryPolicyConfig};
use crate::services::pacing::PacingState;
use crate::utils::retry::{Retryable, RetryConfig, RetryResult, with_retry};

/// Configuration of an existing index, as reported by the store.
#[derive(Debug, Clone)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    /// Data-plane host for upsert/query calls.
    pub host: String,
    pub ready: bool,
}

/// Read-only index diagnostics.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub record_count: u64,
    pub dimension: usize,
    pub fullness: f32,
}

/// Raw operations against a remote vector index.
///
/// Backends perform single round-trips; retry, pacing, and batching live in
/// `VectorStoreManager`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Describe an index, or `None` if it does not exist.
    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, VectorStoreError>;

    /// Create an index. The store rejects duplicates; callers check first.
    async fn create(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
    ) -> Result<(), VectorStoreError>;

    /// Delete an index; deleting a missing index is a no-op.
    async fn delete(&self, name: &str) -> Result<(), VectorStoreError>;

    /// Upsert one batch of records. Existing ids are overwritten.
    async fn upsert(&self, name: &str, records: &[IndexRecord]) -> Result<(), VectorStoreError>;

    /// Top-k nearest records by the index's configured metric.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: u32,
        filter: Option<&Value>,
    ) -> Result<Vec<RetrievalMatch>, VectorStoreError>;

    /// Read-only diagnostics.
    async fn stats(&self, name: &str) -> Result<IndexStats, VectorStoreError>;
}

/// Manages the lifecycle of one target index and stages records into it.
pub struct VectorStoreManager {
    index: Box<dyn VectorIndex>,
    name: String,
    dimension: usize,
    metric: String,
    upsert_batch_size: usize,
    retry: RetryConfig,
    pacing: Mutex<PacingState>,
}

impl VectorStoreManager {
    pub fn new(
        index: Box<dyn VectorIndex>,
        name: impl Into<String>,
        dimension: usize,
        metric: impl Into<String>,
        upsert_batch_size: usize,
        retry: RetryConfig,
        pacing: PacingState,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            dimension,
            metric: metric.into(),
            upsert_batch_size: upsert_batch_size.max(1),
            retry,
            pacing: Mutex::new(pacing),
        }
    }

    /// Build a Pinecone-backed manager from configuration.
    pub fn from_config(
        index: &IndexConfig,
        dimension: usize,
        retry: &RetryPolicyConfig,
        api_key: String,
    ) -> Result<Self, VectorStoreError> {
        let backend = PineconeIndex::new(index, api_key)?;
        Ok(Self::new(
            Box::new(backend),
            index.name.clone(),
            dimension,
            index.metric.clone(),
            index.upsert_batch_size as usize,
            retry.to_retry_config(),
            PacingState::default(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Describe the target index, or `None` when it is absent (e.g. after a
    /// crash mid-reset).
    pub async fn describe_index(&self) -> Result<Option<IndexDescription>, VectorStoreError> {
        self.index.describe(&self.name).await
    }

    /// Create the target index.
    ///
    /// Idempotent when an index of the same name, dimension, and metric
    /// already exists; fails with `IndexConflict` when the name is taken by a
    /// different configuration.
    pub async fn create_index(&self) -> Result<(), VectorStoreError> {
        if let Some(existing) = self.index.describe(&self.name).await? {
            if existing.dimension == self.dimension && existing.metric == self.metric {
                return Ok(());
            }
            return Err(VectorStoreError::IndexConflict {
                name: self.name.clone(),
                existing_dimension: existing.dimension,
                existing_metric: existing.metric,
                requested_dimension: self.dimension,
                requested_metric: self.metric.clone(),
            });
        }

        self.index
            .create(&self.name, self.dimension, &self.metric)
            .await?;
        self.wait_until_ready().await
    }

    /// Delete the target index if it exists.
    pub async fn delete_index(&self) -> Result<(), VectorStoreError> {
        self.index.delete(&self.name).await
    }

    /// Delete and recreate the target index with the same configuration.
    ///
    /// Not atomic: a crash between the two steps leaves the index absent,
    /// which `describe_index` reports so callers can retry creation.
    pub async fn reset_index(&self) -> Result<(), VectorStoreError> {
        self.index.delete(&self.name).await?;
        self.index
            .create(&self.name, self.dimension, &self.metric)
            .await?;
        self.wait_until_ready().await
    }

    /// Stage records into the index in batches.
    ///
    /// Every record's vector length is checked against the index dimension
    /// before any batch is sent; a mismatch is fatal and nothing is
    /// transmitted. Each batch is retried under the shared backoff policy;
    /// exhaustion aborts the current batch but keeps earlier batches.
    pub async fn upsert(&self, records: &[IndexRecord]) -> Result<(), VectorStoreError> {
        for record in records {
            if record.values.len() != self.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.values.len(),
                });
            }
        }

        let mut batches_completed = 0usize;

        for batch in records.chunks(self.upsert_batch_size) {
            let delay = self.pacing.lock().expect("pacing lock").next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match with_retry(&self.retry, || self.index.upsert(&self.name, batch)).await {
                RetryResult::Success { attempts, .. } => {
                    let mut pacing = self.pacing.lock().expect("pacing lock");
                    if attempts > 1 {
                        pacing.record_rate_limit();
                    } else {
                        pacing.record_success();
                    }
                    batches_completed += 1;
                }
                RetryResult::Failed {
                    last_error,
                    attempts,
                } => {
                    if last_error.is_retryable() {
                        self.pacing
                            .lock()
                            .expect("pacing lock")
                            .record_rate_limit();
                        return Err(VectorStoreError::RateLimitExhausted {
                            attempts,
                            batches_completed,
                        });
                    }
                    return Err(last_error);
                }
            }
        }

        Ok(())
    }

    /// Top-k similarity query against the target index.
    pub async fn query(
        &self,
        vector: &[f32],
        top_k: u32,
        filter: Option<&Value>,
    ) -> Result<Vec<RetrievalMatch>, VectorStoreError> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        with_retry(&self.retry, || {
            self.index.query(&self.name, vector, top_k, filter)
        })
        .await
        .into_result()
    }

    /// Read-only diagnostics for the target index.
    pub async fn stats(&self) -> Result<IndexStats, VectorStoreError> {
        with_retry(&self.retry, || self.index.stats(&self.name))
            .await
            .into_result()
    }

    /// Poll until the store reports the freshly created index as ready.
    async fn wait_until_ready(&self) -> Result<(), VectorStoreError> {
        for _ in 0..60 {
            match self.index.describe(&self.name).await? {
                Some(description) if description.ready => return Ok(()),
                _ => tokio::time::sleep(std::time::Duration::from_secs(1)).await,
            }
        }
        Err(VectorStoreError::Api(format!(
            "index '{}' did not become ready",
            self.name
        )))
    }
}
