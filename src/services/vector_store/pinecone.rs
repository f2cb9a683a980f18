//! Pinecone serverless backend.
//!
//! Control-plane calls (create/describe/delete) go to the global API host;
//! data-plane calls (upsert/query/stats) go to the per-index host reported by
//! `describe`, resolved once and cached.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{IndexDescription, IndexStats, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{IndexConfig, IndexRecord, RetrievalMatch};
use crate::services::embedding::retry_after_secs;

const API_VERSION: &str = "2025-01";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Debug, Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    name: String,
    dimension: usize,
    metric: String,
    host: String,
    #[serde(default)]
    status: DescribeStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DescribeStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: u32,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct MatchMetadata {
    #[serde(default)]
    reference: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    index_fullness: f32,
    #[serde(default)]
    total_vector_count: u64,
}

/// Pinecone REST implementation of `VectorIndex`.
pub struct PineconeIndex {
    client: Client,
    control_plane_url: String,
    api_key: String,
    cloud: String,
    region: String,
    /// Index name -> resolved data-plane base URL.
    hosts: Mutex<HashMap<String, String>>,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig, api_key: String) -> Result<Self, VectorStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            api_key,
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            hosts: Mutex::new(HashMap::new()),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn map_send_error(e: reqwest::Error) -> VectorStoreError {
        if e.is_timeout() {
            VectorStoreError::Timeout
        } else {
            VectorStoreError::Connection(e.to_string())
        }
    }

    /// Map non-success statuses shared by all endpoints.
    async fn check_status(response: Response) -> Result<Response, VectorStoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(VectorStoreError::RateLimited {
                retry_after: retry_after_secs(response.headers()),
            });
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(VectorStoreError::Auth(format!("status {status}: {body}")));
        }
        Err(VectorStoreError::Api(format!("status {status}: {body}")))
    }

    /// Resolve (and cache) the data-plane base URL for an index.
    async fn host_for(&self, name: &str) -> Result<String, VectorStoreError> {
        if let Some(host) = self.hosts.lock().expect("host cache lock").get(name) {
            return Ok(host.clone());
        }

        let description = self
            .describe(name)
            .await?
            .ok_or_else(|| VectorStoreError::IndexNotFound(name.to_string()))?;

        let base = if description.host.starts_with("http") {
            description.host
        } else {
            format!("https://{}", description.host)
        };
        self.hosts
            .lock()
            .expect("host cache lock")
            .insert(name.to_string(), base.clone());
        Ok(base)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, VectorStoreError> {
        let url = format!("{}/indexes/{}", self.control_plane_url, name);
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::check_status(response).await?;
        let parsed: DescribeResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        Ok(Some(IndexDescription {
            name: parsed.name,
            dimension: parsed.dimension,
            metric: parsed.metric,
            host: parsed.host,
            ready: parsed.status.ready,
        }))
    }

    async fn create(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
    ) -> Result<(), VectorStoreError> {
        let url = format!("{}/indexes", self.control_plane_url);
        let request = CreateIndexRequest {
            name,
            dimension,
            metric,
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), VectorStoreError> {
        let url = format!("{}/indexes/{}", self.control_plane_url, name);
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        // Deleting a missing index is a no-op.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status(response).await?;
        self.hosts.lock().expect("host cache lock").remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, records: &[IndexRecord]) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let host = self.host_for(name).await?;
        let url = format!("{host}/vectors/upsert");
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&UpsertRequest { vectors: records })
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: u32,
        filter: Option<&Value>,
    ) -> Result<Vec<RetrievalMatch>, VectorStoreError> {
        let host = self.host_for(name).await?;
        let url = format!("{host}/query");
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            filter,
        };

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let response = Self::check_status(response).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| {
                let metadata = m.metadata.unwrap_or_default();
                RetrievalMatch {
                    id: m.id,
                    score: m.score,
                    reference: metadata.reference,
                    text: metadata.text,
                }
            })
            .collect())
    }

    async fn stats(&self, name: &str) -> Result<IndexStats, VectorStoreError> {
        let host = self.host_for(name).await?;
        let url = format!("{host}/describe_index_stats");
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let response = Self::check_status(response).await?;
        let parsed: StatsResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        Ok(IndexStats {
            record_count: parsed.total_vector_count,
            dimension: parsed.dimension,
            fullness: parsed.index_fullness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordMetadata;

    #[test]
    fn test_client_creation() {
        let config = IndexConfig::default();
        assert!(PineconeIndex::new(&config, "key".to_string()).is_ok());
    }

    #[test]
    fn test_upsert_request_serialization() {
        let records = vec![IndexRecord {
            id: "a".to_string(),
            values: vec![0.5, 0.25],
            metadata: RecordMetadata {
                reference: "https://wiki/x/A".to_string(),
                text: "excerpt".to_string(),
            },
        }];
        let json = serde_json::to_value(UpsertRequest { vectors: &records }).unwrap();
        assert_eq!(json["vectors"][0]["id"], "a");
        assert_eq!(json["vectors"][0]["values"][1], 0.25);
        assert_eq!(json["vectors"][0]["metadata"]["reference"], "https://wiki/x/A");
    }

    #[test]
    fn test_query_request_serialization_uses_camel_case() {
        let vector = vec![0.1, 0.2];
        let request = QueryRequest {
            vector: &vector,
            top_k: 5,
            include_metadata: true,
            filter: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["topK"], 5);
        assert_eq!(json["includeMetadata"], true);
        assert!(json.get("filter").is_none());
    }

    #[test]
    fn test_query_response_parsing_tolerates_missing_metadata() {
        let body = r#"{"matches":[{"id":"a","score":0.9},{"id":"b","score":0.5,"metadata":{"reference":"doc-1","text":"t"}}]}"#;
        let parsed: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.matches.len(), 2);
        assert!(parsed.matches[0].metadata.is_none());
        assert_eq!(
            parsed.matches[1].metadata.as_ref().unwrap().reference,
            "doc-1"
        );
    }

    #[test]
    fn test_stats_response_parsing() {
        let body = r#"{"dimension":1536,"indexFullness":0.1,"totalVectorCount":42,"namespaces":{}}"#;
        let parsed: StatsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.dimension, 1536);
        assert_eq!(parsed.total_vector_count, 42);
    }
}
