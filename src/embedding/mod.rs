//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are not configured.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]** — calls the OpenAI embeddings API.
//! - **[`HashedEmbedder`]** — offline feature-hashing bag-of-words vectors.
//! - **`LocalEmbedder`** — fastembed models, behind the `local-embeddings-fastembed` feature.
//!
//! Also provides vector utilities used by the index:
//! - [`cosine_similarity`] and [`l2_distance`]
//! - [`vec_to_blob`] / [`blob_to_vec`] for SQLite BLOB storage
//!
//! # Provider Selection
//!
//! ```rust
//! # use subnet_copilot::config::EmbeddingConfig;
//! # use subnet_copilot::embedding::create_embedder;
//! let config = EmbeddingConfig {
//!     provider: "disabled".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "disabled");
//! ```

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::transport;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

/// A pure `text -> vector` function, batched.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text:v1.5"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch; one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

// ============ Disabled Provider ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default `http://localhost:11434`).
/// Requires the model to be pulled first (e.g. `ollama pull nomic-embed-text:v1.5`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: transport::build_client(Some(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = transport::post_json(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (or a compatible endpoint via `url`).
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client: transport::build_client(Some(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = transport::post_json(
            &self.client,
            &format!("{}/v1/embeddings", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extracts `data[].embedding`, ordered by each item's `index` when present.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

// ============ Hashed Provider ============

/// Offline embedder: lowercase alphanumeric tokens are hashed (SHA-256) into
/// `dims` signed buckets, then the vector is L2-normalized.
///
/// Texts sharing vocabulary land near each other under cosine distance.
/// No network, no model download; meant for air-gapped setups and tests.
pub struct HashedEmbedder {
    dims: usize,
}

impl HashedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vec.iter_mut() {
                *x /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashedEmbedder {
    fn model_name(&self) -> &str {
        "hashed"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Create the appropriate [`Embedder`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"hashed"` | [`HashedEmbedder`] (dims default 256) |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hashed" => Ok(Arc::new(HashedEmbedder::new(config.dims.unwrap_or(256)))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// fastembed model id for `name`, accepting the Ollama tags used by the
/// default config so switching `provider` alone keeps working.
#[cfg_attr(not(feature = "local-embeddings-fastembed"), allow(dead_code))]
pub(crate) fn local_model_id(name: &str) -> &str {
    match name {
        "nomic-embed-text" | "nomic-embed-text:v1.5" | "nomic-embed-text:latest" => {
            "nomic-embed-text-v1.5"
        }
        "nomic-embed-text:v1" => "nomic-embed-text-v1",
        "all-minilm" | "all-minilm:l6-v2" | "all-minilm:latest" => "all-minilm-l6-v2",
        other => other,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use subnet_copilot::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero, or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Euclidean distance; `f32::INFINITY` for mismatched lengths.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
