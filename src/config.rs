//! TOML configuration parsing and validation.
//!
//! Every section except `[corpus]` has defaults matching the reference
//! deployment (Ollama embeddings and generation, 1500/200 character chunks,
//! top-5 retrieval, ten generation attempts). [`load_config`] rejects
//! settings that would make ingestion or generation ill-defined before any
//! work starts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

/// Window size and overlap, both measured in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

/// When a persisted index is rebuilt at startup.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildPolicy {
    /// Build only when the persisted location does not exist.
    #[default]
    IfMissing,
    /// Also rebuild when the stored corpus digest differs from the current corpus.
    IfCorpusChanged,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub rebuild: RebuildPolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
            metric: DistanceMetric::default(),
            rebuild: RebuildPolicy::default(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./chroma_db")
}
fn default_collection() -> String {
    "avax_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dims: Option<usize>,
    /// Base URL for Ollama or an OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> Option<String> {
    Some("nomic-embed-text:v1.5".to_string())
}
fn default_embedding_dims() -> Option<usize> {
    Some(768)
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    /// Ceiling on generator invocations per request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// HTTP-level retries inside a single generator invocation.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
    /// No timeout is applied unless set.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            temperature: None,
            num_ctx: default_num_ctx(),
            max_attempts: default_max_attempts(),
            transport_retries: default_transport_retries(),
            timeout_secs: None,
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "qwen2.5-coder:3b-instruct-q8_0".to_string()
}
fn default_num_ctx() -> u32 {
    16384
}
fn default_max_attempts() -> u32 {
    10
}
fn default_transport_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default)]
    pub include_config_fields: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            include_config_fields: false,
        }
    }
}

fn default_persona() -> String {
    "You are Avalanche-GPT, an assistant that answers developer questions about Avalanche \
     infrastructure and helps them edit their Avalanche network configuration."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Config with every section defaulted and the corpus rooted at `root`.
    ///
    /// Uses the offline `hashed` embedder and a disabled generator, so nothing
    /// built from it reaches the network unless the caller swaps providers.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig {
                root: root.into(),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
                follow_symlinks: false,
            },
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig {
                provider: "hashed".to_string(),
                model: None,
                dims: Some(256),
                ..EmbeddingConfig::default()
            },
            generation: GenerationConfig {
                provider: "disabled".to_string(),
                ..GenerationConfig::default()
            },
            prompt: PromptConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 {
            anyhow::bail!("chunking.size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.size {
            anyhow::bail!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.chunking.overlap,
                self.chunking.size
            );
        }

        if self.retrieval.k == 0 {
            anyhow::bail!("retrieval.k must be >= 1");
        }

        if self.index.collection.trim().is_empty() {
            anyhow::bail!("index.collection must not be empty");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "hashed" | "local" => {}
            "ollama" | "openai" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    anyhow::bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.model.is_none() {
                    anyhow::bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, hashed, local, ollama, or openai.",
                other
            ),
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        match self.generation.provider.as_str() {
            "disabled" | "ollama" | "openai" => {}
            other => anyhow::bail!(
                "Unknown generation provider: '{}'. Must be disabled, ollama, or openai.",
                other
            ),
        }
        if self.generation.max_attempts == 0 {
            anyhow::bail!("generation.max_attempts must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
