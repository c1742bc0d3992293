//! Offline embeddings via fastembed (bundled ONNX runtime).
//!
//! The model is downloaded on first use and kept loaded for the life of the
//! embedder. Inference is CPU-bound, so it runs on the blocking pool.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{local_model_id, Embedder};
use crate::config::EmbeddingConfig;

pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "nomic-embed-text-v1.5".to_string());
        let (model, native_dims) = model_for_name(local_model_id(&model_name))?;
        let dims = config.dims.unwrap_or(native_dims);
        if dims != native_dims {
            bail!(
                "embedding.dims = {} does not match {} (produces {} dims)",
                dims,
                model_name,
                native_dims
            );
        }

        Ok(Self {
            model_name,
            model,
            dims,
            batch_size: config.batch_size.max(1),
            loaded: Arc::new(Mutex::new(None)),
        })
    }
}

fn model_for_name(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel::*;
    match name {
        "all-minilm-l6-v2" => Ok((AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((BGEBaseENV15, 768)),
        "nomic-embed-text-v1" => Ok((NomicEmbedTextV1, 768)),
        "nomic-embed-text-v1.5" => Ok((NomicEmbedTextV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let text_embedding = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(text_embedding);
            }
            let Some(text_embedding) = guard.as_mut() else {
                bail!("local embedding model not loaded");
            };
            text_embedding
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}
