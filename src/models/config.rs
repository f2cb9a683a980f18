use serde::{Deserialize, Serialize};

use crate::services::generator::PromptRole;

pub const DEFAULT_EMBEDDING_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo-0125";
pub const DEFAULT_CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
pub const DEFAULT_INDEX_NAME: &str = "sourcewise";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub retry: RetryPolicyConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    pub fn config_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join("sourcewise").join("config.toml"))
    }

    pub fn load() -> Result<Self, crate::error::ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), crate::error::ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            crate::error::ConfigError::PathError("could not determine config directory".to_string())
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Read the embedding/completion service credential from the environment.
    pub fn openai_api_key() -> Result<String, crate::error::ConfigError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| crate::error::ConfigError::MissingCredential("OPENAI_API_KEY"))
    }

    /// Read the vector store credential from the environment.
    pub fn pinecone_api_key() -> Result<String, crate::error::ConfigError> {
        std::env::var("PINECONE_API_KEY")
            .map_err(|_| crate::error::ConfigError::MissingCredential("PINECONE_API_KEY"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_api_base")]
    pub api_base: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector length produced by the model; must match the index dimension.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: u32,

    /// Texts per embedding request. Smaller batches reduce rate-limit risk.
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_api_base() -> String {
    DEFAULT_EMBEDDING_API_BASE.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_batch_size() -> u32 {
    25
}

fn default_timeout() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: default_embedding_api_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,

    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,

    #[serde(default = "default_metric")]
    pub metric: String,

    #[serde(default = "default_cloud")]
    pub cloud: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Records per upsert request.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_control_plane_url() -> String {
    DEFAULT_CONTROL_PLANE_URL.to_string()
}

fn default_metric() -> String {
    "cosine".to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_upsert_batch_size() -> u32 {
    100
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
            control_plane_url: default_control_plane_url(),
            metric: default_metric(),
            cloud: default_cloud(),
            region: default_region(),
            upsert_batch_size: default_upsert_batch_size(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_embedding_api_base")]
    pub api_base: String,

    #[serde(default = "default_completion_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Input budget for the assembled prompt, in estimated tokens.
    #[serde(default = "default_prompt_token_budget")]
    pub prompt_token_budget: u32,

    /// System-prompt persona used when answering.
    #[serde(default)]
    pub role: PromptRole,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_prompt_token_budget() -> u32 {
    3000
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_base: default_embedding_api_base(),
            model: default_completion_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            prompt_token_budget: default_prompt_token_budget(),
            role: PromptRole::default(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    /// Maximum attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicyConfig {
    pub fn to_retry_config(&self) -> crate::utils::retry::RetryConfig {
        crate::utils::retry::RetryConfig::new(self.max_attempts)
            .with_base_delay(std::time::Duration::from_millis(self.base_delay_ms))
            .with_max_delay(std::time::Duration::from_millis(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Cap on corpus rows read per run.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Character budget per fragment, sized to the embedding input limit.
    #[serde(default = "default_max_fragment_chars")]
    pub max_fragment_chars: usize,

    #[serde(default = "default_fragment_overlap")]
    pub fragment_overlap: usize,
}

fn default_max_rows() -> usize {
    2000
}

fn default_max_fragment_chars() -> usize {
    8000
}

fn default_fragment_overlap() -> usize {
    200
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_fragment_chars: default_max_fragment_chars(),
            fragment_overlap: default_fragment_overlap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_top_k() -> u32 {
    3
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}
