//! Retrieval-augmented answer generation.
//!
//! Embeds the query, retrieves top-k context from the vector index, assembles
//! a budget-bounded prompt, and calls the completion service once under the
//! shared backoff policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AskError, CompletionError};
use crate::models::{Answer, CompletionConfig, RetrievalMatch};
use crate::services::embedding::{EmbeddingClient, retry_after_secs};
use crate::services::vector_store::VectorStoreManager;
use crate::utils::retry::{Retryable, RetryConfig, RetryResult, with_retry};
use crate::utils::text::estimate_tokens;

/// System-prompt persona for the completion model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    CustomerService,
    TechnicalSupport,
    #[default]
    GeneralAssistant,
}

impl std::str::FromStr for PromptRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "customer_service" => Ok(PromptRole::CustomerService),
            "technical_support" => Ok(PromptRole::TechnicalSupport),
            "general_assistant" => Ok(PromptRole::GeneralAssistant),
            _ => Err(format!("unknown prompt role: {}", s)),
        }
    }
}

impl PromptRole {
    /// System prompt for this persona.
    pub fn system_prompt(self) -> &'static str {
        match self {
            PromptRole::CustomerService => {
                "You are a helpful customer service specialist who provides accurate \
                 and helpful information based on the provided context.\n\
                 Answer questions based ONLY on the context provided. If you don't \
                 know the answer based on the context, acknowledge that and don't \
                 make up information. Be concise and clear, maintain a professional, \
                 friendly tone, and cite the source of your information when relevant."
            }
            PromptRole::TechnicalSupport => {
                "You are a technical support specialist who helps users solve \
                 technical problems based on the provided context.\n\
                 Answer questions based ONLY on the technical documentation provided \
                 in the context. Provide step-by-step troubleshooting instructions \
                 when appropriate, and if you don't know the answer based on the \
                 context, acknowledge that rather than inventing technical details."
            }
            PromptRole::GeneralAssistant => {
                "You are a helpful assistant who provides information based strictly \
                 on the provided context.\n\
                 Answer questions based ONLY on the context provided. If the \
                 information is not in the context, acknowledge that and don't make \
                 up information. Be helpful, concise, and accurate."
            }
        }
    }
}

/// One chat message in a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// One round-trip to the completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// OpenAI-style `/chat/completions` backend.
pub struct OpenAiChat {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
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
                    CompletionError::Timeout
                } else {
                    CompletionError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CompletionError::RateLimited {
                retry_after: retry_after_secs(response.headers()),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Auth(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api(format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("no completion choices".to_string()))
    }
}

/// Orchestrates query embedding, retrieval, prompt assembly, and completion.
pub struct RetrievalAugmentedGenerator {
    embedder: EmbeddingClient,
    store: VectorStoreManager,
    completion: Box<dyn CompletionBackend>,
    config: CompletionConfig,
    retry: RetryConfig,
}

impl RetrievalAugmentedGenerator {
    pub fn new(
        embedder: EmbeddingClient,
        store: VectorStoreManager,
        completion: Box<dyn CompletionBackend>,
        config: CompletionConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            completion,
            config,
            retry,
        }
    }

    /// Answer a query grounded in the top-k retrieved excerpts.
    ///
    /// Zero retrieval matches is not an error: the answer is generated from
    /// the query alone and flagged `no_context`.
    pub async fn answer(&self, query: &str, top_k: u32) -> Result<Answer, AskError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AskError::InvalidQuery("query cannot be empty".to_string()));
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let matches = self.store.query(&query_vector, top_k, None).await?;

        let kept = self.fit_to_budget(query, &matches);
        let messages = self.build_messages(query, kept);

        let text = with_retry(&self.retry, || self.completion.complete(&messages))
            .await
            .map_err_exhausted()?;

        Ok(Answer::new(text, kept, !matches.is_empty()))
    }

    /// Drop lowest-scoring excerpts until the assembled prompt fits the
    /// configured token budget. Matches arrive sorted descending by score, so
    /// dropping from the tail removes the weakest context first.
    fn fit_to_budget<'a>(&self, query: &str, matches: &'a [RetrievalMatch]) -> &'a [RetrievalMatch] {
        let budget = self.config.prompt_token_budget as usize;
        let mut keep = matches.len();
        while keep > 0 {
            let prompt = build_prompt(query, &matches[..keep]);
            if estimate_tokens(self.config.role.system_prompt()) + estimate_tokens(&prompt) <= budget
            {
                break;
            }
            keep -= 1;
        }
        &matches[..keep]
    }

    fn build_messages(&self, query: &str, kept: &[RetrievalMatch]) -> Vec<ChatMessage> {
        let user = if kept.is_empty() {
            query.to_string()
        } else {
            build_prompt(query, kept)
        };
        vec![
            ChatMessage::system(self.config.role.system_prompt()),
            ChatMessage::user(user),
        ]
    }
}

/// Assemble the context-augmented user prompt.
fn build_prompt(query: &str, matches: &[RetrievalMatch]) -> String {
    let contexts: Vec<String> = matches
        .iter()
        .map(|m| format!("[{}]\n{}", m.reference, m.text))
        .collect();
    format!(
        "Answer the question based on the context below.\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
        contexts.join("\n\n---\n\n"),
        query
    )
}

/// Fold retry exhaustion into the completion error taxonomy.
trait MapExhausted {
    type Ok;
    fn map_err_exhausted(self) -> Result<Self::Ok, CompletionError>;
}

impl<T> MapExhausted for RetryResult<T, CompletionError> {
    type Ok = T;

    fn map_err_exhausted(self) -> Result<T, CompletionError> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed {
                last_error,
                attempts,
            } => {
                if last_error.is_retryable() {
                    Err(CompletionError::RateLimitExhausted { attempts })
                } else {
                    Err(last_error)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::models::{IndexRecord, RecordMetadata};
    use crate::services::embedding::EmbeddingBackend;
    use crate::services::pacing::PacingState;
    use crate::services::vector_store::memory::InMemoryIndex;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Embedding backend that returns a constant unit vector.
    struct ConstantEmbedding;

    #[async_trait]
    impl EmbeddingBackend for ConstantEmbedding {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Completion backend that records prompts and replays scripted replies.
    struct ScriptedCompletion {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedCompletion {
        fn new(replies: Vec<Result<String, CompletionError>>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    replies: Mutex::new(replies.into()),
                    prompts: Arc::clone(&prompts),
                },
                prompts,
            )
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedCompletion {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
            let user = messages
                .iter()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(user);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok("default reply".to_string()))
        }
    }

    fn quick_retry() -> RetryConfig {
        RetryConfig::new(3).with_base_delay(Duration::from_millis(1))
    }

    fn embedder() -> EmbeddingClient {
        EmbeddingClient::new(
            Box::new(ConstantEmbedding),
            8,
            quick_retry(),
            PacingState::disabled(),
        )
    }

    fn store(backend: &Arc<InMemoryIndex>) -> VectorStoreManager {
        VectorStoreManager::new(
            Box::new(Arc::clone(backend)),
            "kb",
            2,
            "cosine",
            100,
            quick_retry(),
            PacingState::disabled(),
        )
    }

    async fn seeded_store(records: &[IndexRecord]) -> VectorStoreManager {
        let backend = InMemoryIndex::new();
        let store = store(&backend);
        store.create_index().await.unwrap();
        store.upsert(records).await.unwrap();
        store
    }

    fn record(id: &str, reference: &str, text: &str, values: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            values,
            metadata: RecordMetadata {
                reference: reference.to_string(),
                text: text.to_string(),
            },
        }
    }

    fn generator(
        store: VectorStoreManager,
        completion: ScriptedCompletion,
        config: CompletionConfig,
    ) -> RetrievalAugmentedGenerator {
        RetrievalAugmentedGenerator::new(
            embedder(),
            store,
            Box::new(completion),
            config,
            quick_retry(),
        )
    }

    #[tokio::test]
    async fn test_answer_cites_single_matching_record() {
        let store = seeded_store(&[record(
            "a",
            "doc-1",
            "X is a thing described here.",
            vec![1.0, 0.0],
        )])
        .await;
        let (completion, prompts) =
            ScriptedCompletion::new(vec![Ok("X is a thing.".to_string())]);
        let generator = generator(store, completion, CompletionConfig::default());

        let answer = generator.answer("What is X?", 5).await.unwrap();

        assert_eq!(answer.text, "X is a thing.");
        assert_eq!(answer.sources, vec!["doc-1"]);
        assert!(!answer.no_context);

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[doc-1]"));
        assert!(prompts[0].contains("Question: What is X?"));
    }

    #[tokio::test]
    async fn test_zero_matches_yields_flagged_no_context_answer() {
        let backend = InMemoryIndex::new();
        let store = store(&backend);
        store.create_index().await.unwrap();

        let (completion, prompts) =
            ScriptedCompletion::new(vec![Ok("I don't have context.".to_string())]);
        let generator = generator(store, completion, CompletionConfig::default());

        let answer = generator.answer("What is X?", 5).await.unwrap();

        assert!(answer.no_context);
        assert!(answer.sources.is_empty());
        assert_eq!(answer.text, "I don't have context.");

        // Augmentation is skipped: the model sees the bare query.
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts[0], "What is X?");
    }

    #[tokio::test]
    async fn test_budget_drops_lowest_scoring_excerpts_first() {
        let store = seeded_store(&[
            record("a", "doc-best", &"best ".repeat(40), vec![1.0, 0.0]),
            record("b", "doc-worst", &"worst ".repeat(40), vec![0.0, 1.0]),
        ])
        .await;
        let (completion, prompts) = ScriptedCompletion::new(vec![Ok("answer".to_string())]);
        let config = CompletionConfig {
            // Enough for one excerpt plus scaffolding, not two.
            prompt_token_budget: 200,
            ..Default::default()
        };
        let generator = generator(store, completion, config);

        let answer = generator.answer("which?", 5).await.unwrap();

        assert_eq!(answer.sources, vec!["doc-best"]);
        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("doc-best"));
        assert!(!prompts[0].contains("doc-worst"));
    }

    #[tokio::test]
    async fn test_budget_trimming_all_context_is_not_no_context() {
        let store = seeded_store(&[record(
            "a",
            "doc-1",
            &"filler ".repeat(40),
            vec![1.0, 0.0],
        )])
        .await;
        let (completion, prompts) = ScriptedCompletion::new(vec![Ok("answer".to_string())]);
        let config = CompletionConfig {
            // Nothing fits: every excerpt gets dropped.
            prompt_token_budget: 0,
            ..Default::default()
        };
        let generator = generator(store, completion, config);

        let answer = generator.answer("which?", 5).await.unwrap();

        // Retrieval did find a match; an empty citation list from budget
        // trimming must not masquerade as a no-context answer.
        assert!(!answer.no_context);
        assert!(answer.sources.is_empty());
        assert_eq!(prompts.lock().unwrap()[0], "which?");
    }

    #[tokio::test]
    async fn test_completion_rate_limit_is_retried() {
        let store = seeded_store(&[record("a", "doc-1", "context", vec![1.0, 0.0])]).await;
        let (completion, _) = ScriptedCompletion::new(vec![
            Err(CompletionError::RateLimited { retry_after: None }),
            Ok("recovered".to_string()),
        ]);
        let generator = generator(store, completion, CompletionConfig::default());

        let answer = generator.answer("q", 3).await.unwrap();
        assert_eq!(answer.text, "recovered");
    }

    #[tokio::test]
    async fn test_completion_exhaustion_surfaces_error() {
        let store = seeded_store(&[record("a", "doc-1", "context", vec![1.0, 0.0])]).await;
        let (completion, _) = ScriptedCompletion::new(vec![
            Err(CompletionError::RateLimited { retry_after: None }),
            Err(CompletionError::RateLimited { retry_after: None }),
            Err(CompletionError::RateLimited { retry_after: None }),
        ]);
        let generator = generator(store, completion, CompletionConfig::default());

        let err = generator.answer("q", 3).await.unwrap_err();
        assert!(matches!(
            err,
            AskError::Completion(CompletionError::RateLimitExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let store = seeded_store(&[]).await;
        let (completion, _) = ScriptedCompletion::new(vec![]);
        let generator = generator(store, completion, CompletionConfig::default());

        let err = generator.answer("   ", 3).await.unwrap_err();
        assert!(matches!(err, AskError::InvalidQuery(_)));
    }

    #[test]
    fn test_prompt_role_parsing() {
        assert_eq!(
            "customer_service".parse::<PromptRole>().unwrap(),
            PromptRole::CustomerService
        );
        assert_eq!(
            "technical-support".parse::<PromptRole>().unwrap(),
            PromptRole::TechnicalSupport
        );
        assert!("wizard".parse::<PromptRole>().is_err());
    }
}
