//! Configuration for the RAG pipeline.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values, which
//! take precedence over the defaults of the selected provider preset.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound on texts per embedding request. Some compatible gateways
/// reject batches above 25 items.
pub const MAX_EMBEDDING_BATCH: usize = 10;

/// Known OpenAI-compatible service presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    #[default]
    DashScope,
    Other,
}

impl Provider {
    /// Default base URL (including the version path).
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Provider::Other => "http://localhost:8000/v1",
        }
    }

    pub fn default_chat_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-3.5-turbo",
            Provider::DashScope => "qwen-plus",
            Provider::Other => "meta-llama/Llama-2-7b-chat-hf",
        }
    }

    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            Provider::OpenAi | Provider::Other => "text-embedding-ada-002",
            Provider::DashScope => "text-embedding-v1",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "dashscope" | "qwen" => Ok(Provider::DashScope),
            "other" | "local" => Ok(Provider::Other),
            other => Err(format!(
                "unknown provider '{}' (expected openai, dashscope or other)",
                other
            )),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::DashScope => "dashscope",
            Provider::Other => "other",
        };
        f.write_str(name)
    }
}

/// Chat model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the API, including the version path
    /// (e.g., "https://api.openai.com/v1")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Chat model name (e.g., "gpt-3.5-turbo", "qwen-plus")
    pub model: String,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        let provider = Provider::default();
        Self {
            api_base: provider.default_api_base().to_string(),
            api_key: String::new(),
            model: provider.default_chat_model().to_string(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Embedding model configuration. Shares base URL, key and timeout with [`LlmConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Texts per request, never above [`MAX_EMBEDDING_BATCH`].
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    MAX_EMBEDDING_BATCH
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: Provider::default().default_embedding_model().to_string(),
            batch_size: default_batch_size(),
        }
    }
}

/// On-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the vector collection.
    pub collection_dir: PathBuf,
    /// JSON file holding the evaluation test set.
    pub test_set_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            collection_dir: PathBuf::from("data/chroma_db"),
            test_set_path: PathBuf::from("data/test_set.json"),
        }
    }
}

impl StorageConfig {
    /// Place both storage paths under a common data directory.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            collection_dir: dir.join("chroma_db"),
            test_set_path: dir.join("test_set.json"),
        }
    }
}

/// Configuration for text chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Retrieval settings for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Service preset the defaults were taken from
    pub provider: Provider,
    /// Chat model settings (also used by the judge)
    pub llm: LlmConfig,
    /// Embedding model settings
    pub embedding: EmbeddingConfig,
    /// Storage locations
    pub storage: StorageConfig,
    /// Chunking parameters for ingest
    pub chunking: ChunkConfig,
    /// Retrieval parameters
    pub retrieval: RetrievalConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    provider: Option<Provider>,
    llm: Option<LlmFileSection>,
    embedding: Option<EmbeddingFileSection>,
    storage: Option<StorageConfig>,
    chunking: Option<ChunkConfig>,
    retrieval: Option<RetrievalConfig>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    model: Option<String>,
    batch_size: Option<usize>,
}

impl Config {
    /// Defaults for a given provider preset.
    pub fn for_provider(provider: Provider) -> Self {
        let mut config = Config {
            provider,
            ..Default::default()
        };
        config.apply_provider(provider);
        config
    }

    /// Switch to a provider preset, replacing base URL and model names.
    pub fn apply_provider(&mut self, provider: Provider) {
        self.provider = provider;
        self.llm.api_base = provider.default_api_base().to_string();
        self.llm.model = provider.default_chat_model().to_string();
        self.embedding.model = provider.default_embedding_model().to_string();
    }

    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/finrag/config.yaml)
    /// 3. Provider preset defaults
    pub fn load() -> Result<Self> {
        let file = match Self::config_file_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => ConfigFile::default(),
        };

        let mut config = Self::from_file_section(file, |key| env::var(key).ok())?;
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path (no environment overrides).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = Self::read_file(path)?;
        Self::from_file_section(file, |_| None)
    }

    fn read_file(path: &Path) -> Result<ConfigFile> {
        let content =
            std::fs::read_to_string(path).map_err(|e| RagError::persistence(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| RagError::Config(format!("Failed to parse config file: {}", e)))
    }

    fn from_file_section(
        file: ConfigFile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        // The provider must be known before file values are layered on top.
        let provider = match lookup("FINRAG_PROVIDER") {
            Some(name) => name.parse().map_err(RagError::Config)?,
            None => file.provider.unwrap_or_default(),
        };
        let mut config = Config::for_provider(provider);

        if let Some(llm) = file.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(embedding) = file.embedding {
            if let Some(model) = embedding.model {
                config.embedding.model = model;
            }
            if let Some(batch_size) = embedding.batch_size {
                config.embedding.batch_size = batch_size;
            }
        }

        if let Some(storage) = file.storage {
            config.storage = storage;
        }
        if let Some(chunking) = file.chunking {
            config.chunking = chunking;
        }
        if let Some(retrieval) = file.retrieval {
            config.retrieval = retrieval;
        }

        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_base) = lookup("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        // The provider-specific variables are what the hosted services document.
        if let Some(api_key) = lookup("LLM_API_KEY")
            .or_else(|| lookup("DASHSCOPE_API_KEY"))
            .or_else(|| lookup("OPENAI_API_KEY"))
        {
            self.llm.api_key = api_key;
        }

        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Some(timeout) = lookup("LLM_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.llm.timeout_secs = secs;
            }
        }

        if let Some(dir) = lookup("FINRAG_DATA_DIR") {
            self.storage = StorageConfig::rooted_at(Path::new(&dir));
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "finrag")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Embedding batch size after applying the service cap.
    pub fn embedding_batch_size(&self) -> usize {
        self.embedding.batch_size.clamp(1, MAX_EMBEDDING_BATCH)
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagError::Config(
                "API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(RagError::Config(
                "API key is required. Set LLM_API_KEY (or DASHSCOPE_API_KEY / OPENAI_API_KEY) environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(RagError::Config(
                "Chat model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.embedding.model.is_empty() {
            return Err(RagError::Config(
                "Embedding model is required. Set EMBEDDING_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size
        {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than a non-zero chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
