//! In-memory vector index used by tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{IndexDescription, IndexStats, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{IndexRecord, RetrievalMatch};

#[derive(Default)]
struct StoredIndex {
    dimension: usize,
    metric: String,
    records: BTreeMap<String, IndexRecord>,
}

/// Test double with cosine scoring, call recording, and scripted upsert
/// failures.
#[derive(Default)]
pub struct InMemoryIndex {
    indexes: Mutex<BTreeMap<String, StoredIndex>>,
    upsert_calls: Mutex<Vec<usize>>,
    /// Upsert call indexes (0-based) that fail with a rate limit.
    failing_upserts: Mutex<Vec<usize>>,
}

impl InMemoryIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record sizes of every upsert call seen, including failed ones.
    pub fn upsert_batch_sizes(&self) -> Vec<usize> {
        self.upsert_calls.lock().unwrap().clone()
    }

    /// Make `count` consecutive upsert calls starting at `from` rate-limited.
    pub fn fail_upserts_from(&self, from: usize, count: usize) {
        let mut failing = self.failing_upserts.lock().unwrap();
        failing.extend(from..from + count);
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }

    fn matches_filter(record: &IndexRecord, filter: Option<&Value>) -> bool {
        let Some(Value::Object(fields)) = filter else {
            return true;
        };
        fields.iter().all(|(key, expected)| match key.as_str() {
            "reference" => Value::String(record.metadata.reference.clone()) == *expected,
            _ => false,
        })
    }
}

#[async_trait]
impl VectorIndex for Arc<InMemoryIndex> {
    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, VectorStoreError> {
        let indexes = self.indexes.lock().unwrap();
        Ok(indexes.get(name).map(|index| IndexDescription {
            name: name.to_string(),
            dimension: index.dimension,
            metric: index.metric.clone(),
            host: format!("{name}.memory.test"),
            ready: true,
        }))
    }

    async fn create(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
    ) -> Result<(), VectorStoreError> {
        let mut indexes = self.indexes.lock().unwrap();
        if indexes.contains_key(name) {
            return Err(VectorStoreError::Api(format!(
                "index '{name}' already exists"
            )));
        }
        indexes.insert(
            name.to_string(),
            StoredIndex {
                dimension,
                metric: metric.to_string(),
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), VectorStoreError> {
        self.indexes.lock().unwrap().remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, records: &[IndexRecord]) -> Result<(), VectorStoreError> {
        let call_index = {
            let mut calls = self.upsert_calls.lock().unwrap();
            calls.push(records.len());
            calls.len() - 1
        };
        if self.failing_upserts.lock().unwrap().contains(&call_index) {
            return Err(VectorStoreError::RateLimited { retry_after: None });
        }

        let mut indexes = self.indexes.lock().unwrap();
        let index = indexes
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::IndexNotFound(name.to_string()))?;
        for record in records {
            index.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: u32,
        filter: Option<&Value>,
    ) -> Result<Vec<RetrievalMatch>, VectorStoreError> {
        let indexes = self.indexes.lock().unwrap();
        let index = indexes
            .get(name)
            .ok_or_else(|| VectorStoreError::IndexNotFound(name.to_string()))?;

        let mut matches: Vec<RetrievalMatch> = index
            .records
            .values()
            .filter(|record| InMemoryIndex::matches_filter(record, filter))
            .map(|record| RetrievalMatch {
                id: record.id.clone(),
                score: InMemoryIndex::cosine(vector, &record.values),
                reference: record.metadata.reference.clone(),
                text: record.metadata.text.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k as usize);
        Ok(matches)
    }

    async fn stats(&self, name: &str) -> Result<IndexStats, VectorStoreError> {
        let indexes = self.indexes.lock().unwrap();
        let index = indexes
            .get(name)
            .ok_or_else(|| VectorStoreError::IndexNotFound(name.to_string()))?;
        Ok(IndexStats {
            record_count: index.records.len() as u64,
            dimension: index.dimension,
            fullness: 0.0,
        })
    }
}
