//! Embedding client: batched requests to the embedding service with
//! rate-limit backoff and adaptive pacing.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, RetryPolicyConfig};
use crate::services::pacing::PacingState;
use crate::utils::retry::{Retryable, RetryConfig, RetryResult, with_retry};

/// One round-trip to the embedding service.
///
/// The HTTP implementation is `OpenAiEmbeddings`; tests substitute fakes.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed `texts` in a single request, returning one vector per input in
    /// input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI-style `/embeddings` backend.
pub struct OpenAiEmbeddings {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

/// Parse a Retry-After header value in seconds, if present.
pub(crate) fn retry_after_secs(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.api_base);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited {
                retry_after: retry_after_secs(response.headers()),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Auth(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("status {status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The service reports each embedding's input index; restore order.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Batched embedding client.
///
/// Partitions input into chunks of at most `batch_size`, one service call per
/// chunk, retrying rate-limit and timeout signals under the shared backoff
/// policy. Chunks run sequentially with an adaptive pause between them.
pub struct EmbeddingClient {
    backend: Box<dyn EmbeddingBackend>,
    batch_size: usize,
    retry: RetryConfig,
    pacing: Mutex<PacingState>,
}

impl EmbeddingClient {
    pub fn new(
        backend: Box<dyn EmbeddingBackend>,
        batch_size: usize,
        retry: RetryConfig,
        pacing: PacingState,
    ) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            retry,
            pacing: Mutex::new(pacing),
        }
    }

    /// Build an HTTP-backed client from configuration.
    pub fn from_config(
        embedding: &EmbeddingConfig,
        retry: &RetryPolicyConfig,
        api_key: String,
    ) -> Result<Self, EmbeddingError> {
        let backend = OpenAiEmbeddings::new(embedding, api_key)?;
        Ok(Self::new(
            Box::new(backend),
            embedding.batch_size as usize,
            retry.to_retry_config(),
            PacingState::default(),
        ))
    }

    /// Embed a batch of texts, preserving input order 1:1 with output.
    ///
    /// If retries are exhausted on one chunk, the returned
    /// `RateLimitExhausted` error carries the vectors completed for earlier
    /// chunks so callers can keep that progress. Non-transient errors
    /// propagate immediately without retry.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_vectors = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let delay = self.pacing.lock().expect("pacing lock").next_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match with_retry(&self.retry, || self.backend.embed(chunk)).await {
                RetryResult::Success { value, attempts } => {
                    let mut pacing = self.pacing.lock().expect("pacing lock");
                    if attempts > 1 {
                        pacing.record_rate_limit();
                    } else {
                        pacing.record_success();
                    }
                    all_vectors.extend(value);
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
                        return Err(EmbeddingError::RateLimitExhausted {
                            attempts,
                            completed: all_vectors,
                        });
                    }
                    return Err(last_error);
                }
            }
        }

        Ok(all_vectors)
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted backend: one entry per expected call, `None` meaning success.
    /// Successful calls echo each input text parsed as a number, so order
    /// preservation is observable in the output vectors.
    pub struct ScriptedBackend {
        script: Mutex<VecDeque<Option<EmbeddingError>>>,
        call_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedBackend {
        pub fn always_ok() -> Arc<Self> {
            Self::with_script(Vec::new())
        }

        pub fn with_script(failures: Vec<Option<EmbeddingError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(failures.into()),
                call_sizes: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.call_sizes.lock().unwrap().len()
        }

        pub fn call_sizes(&self) -> Vec<usize> {
            self.call_sizes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmbeddingBackend for Arc<ScriptedBackend> {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.call_sizes.lock().unwrap().push(texts.len());
            if let Some(Some(error)) = self.script.lock().unwrap().pop_front() {
                return Err(error);
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.parse::<f32>().unwrap_or(-1.0)])
                .collect())
        }
    }

    pub fn quick_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts)
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ScriptedBackend, quick_retry};
    use super::*;
    use std::sync::Arc;

    fn numbered_texts(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    fn client_with(
        backend: &Arc<ScriptedBackend>,
        batch_size: usize,
        max_attempts: u32,
    ) -> EmbeddingClient {
        EmbeddingClient::new(
            Box::new(Arc::clone(backend)),
            batch_size,
            quick_retry(max_attempts),
            PacingState::disabled(),
        )
    }

    #[tokio::test]
    async fn test_batching_is_observationally_transparent() {
        let texts = numbered_texts(5);
        for batch_size in 1..=5 {
            let backend = ScriptedBackend::always_ok();
            let client = client_with(&backend, batch_size, 3);
            let vectors = client.embed_batch(&texts).await.unwrap();

            assert_eq!(vectors.len(), texts.len());
            for (i, vector) in vectors.iter().enumerate() {
                assert_eq!(vector[0], i as f32, "batch_size {batch_size} broke order");
            }
        }
    }

    #[tokio::test]
    async fn test_chunk_sizes_respect_batch_size() {
        let backend = ScriptedBackend::always_ok();
        let client = client_with(&backend, 2, 3);
        client.embed_batch(&numbered_texts(5)).await.unwrap();

        assert_eq!(backend.call_sizes(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_rate_limit_twice_then_success() {
        let backend = ScriptedBackend::with_script(vec![
            Some(EmbeddingError::RateLimited { retry_after: None }),
            Some(EmbeddingError::RateLimited {
                retry_after: Some(1),
            }),
            None,
        ]);
        let client = client_with(&backend, 8, 3);

        let vectors = client.embed_batch(&numbered_texts(1)).await.unwrap();
        assert_eq!(vectors, vec![vec![0.0]]);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_preserves_prior_chunks() {
        // First chunk succeeds; second chunk is rate limited on all attempts.
        let backend = ScriptedBackend::with_script(vec![
            None,
            Some(EmbeddingError::RateLimited { retry_after: None }),
            Some(EmbeddingError::RateLimited { retry_after: None }),
            Some(EmbeddingError::RateLimited { retry_after: None }),
        ]);
        let client = client_with(&backend, 2, 3);

        let err = client.embed_batch(&numbered_texts(4)).await.unwrap_err();
        match err {
            EmbeddingError::RateLimitExhausted {
                attempts,
                completed,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(completed, vec![vec![0.0], vec![1.0]]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal_without_retry() {
        let backend = ScriptedBackend::with_script(vec![Some(EmbeddingError::Auth(
            "invalid api key".to_string(),
        ))]);
        let client = client_with(&backend, 8, 3);

        let err = client.embed_batch(&numbered_texts(2)).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Auth(_)));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_like_rate_limit() {
        let backend = ScriptedBackend::with_script(vec![Some(EmbeddingError::Timeout), None]);
        let client = client_with(&backend, 8, 3);

        let vectors = client.embed_batch(&numbered_texts(1)).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_pacing_applies_between_separate_calls() {
        // The pipeline sends one embed_batch call per batch, so the pause has
        // to carry over from one call to the next on the same client. Pin the
        // delay with floor == initial so a success cannot shrink it.
        let backend = ScriptedBackend::always_ok();
        let pacing = PacingState::new(
            Duration::from_millis(50),
            Duration::from_millis(50),
            Duration::from_secs(1),
        );
        let client = EmbeddingClient::new(Box::new(Arc::clone(&backend)), 8, quick_retry(3), pacing);

        client.embed_batch(&numbered_texts(1)).await.unwrap();
        let start = std::time::Instant::now();
        client.embed_batch(&numbered_texts(1)).await.unwrap();

        assert!(
            start.elapsed() >= Duration::from_millis(50),
            "second call was not paced"
        );
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_embed_query_returns_single_vector() {
        let backend = ScriptedBackend::always_ok();
        let client = client_with(&backend, 8, 3);
        let vector = client.embed_query("7").await.unwrap();
        assert_eq!(vector, vec![7.0]);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let backend = ScriptedBackend::always_ok();
        let client = client_with(&backend, 8, 3);
        let vectors = client.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(backend.calls(), 0);
    }
}
