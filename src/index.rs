//! The semantic index: embedded chunks of one named collection, queried by
//! vector similarity.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► build(chunks) ──► ready ──► query(text, k)
//!      └──► load() ─────────┘
//! ```
//!
//! `build` is idempotent per collection: when the store already holds a
//! complete copy, the persisted entries are loaded and nothing is embedded.
//! Under [`RebuildPolicy::IfCorpusChanged`] the stored corpus digest must
//! also match the chunks passed in, otherwise the collection is re-embedded.
//!
//! Loaded entries sit behind a read-write lock as an `Arc<[IndexEntry]>`, so
//! queries take a cheap snapshot and never block each other.

use anyhow::anyhow;
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::config::{DistanceMetric, IndexConfig, RebuildPolicy};
use crate::embedding::{cosine_similarity, l2_distance, Embedder};
use crate::error::CopilotError;
use crate::models::{Chunk, ScoredChunk};
use crate::store::{IndexEntry, IndexManifest, VectorStore};

/// What [`SemanticIndex::build`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Chunks were embedded and persisted.
    Built { chunks: usize },
    /// A complete persisted copy existed and was loaded instead.
    Skipped { chunks: usize },
}

pub struct SemanticIndex {
    store: Box<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    collection: String,
    metric: DistanceMetric,
    rebuild: RebuildPolicy,
    batch_size: usize,
    entries: RwLock<Option<Arc<[IndexEntry]>>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl SemanticIndex {
    pub fn new(
        store: Box<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &IndexConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            collection: config.collection.clone(),
            metric: config.metric,
            rebuild: config.rebuild,
            batch_size: batch_size.max(1),
            entries: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rebuild_policy(&self) -> RebuildPolicy {
        self.rebuild
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Number of loaded entries (0 before build/load).
    pub fn len(&self) -> usize {
        self.snapshot().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the store holds a complete copy of this collection.
    pub async fn is_persisted(&self) -> Result<bool, CopilotError> {
        self.store
            .is_persisted(&self.collection)
            .await
            .map_err(CopilotError::Storage)
    }

    fn snapshot(&self) -> Option<Arc<[IndexEntry]>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn install(&self, entries: Vec<IndexEntry>) {
        let entries: Arc<[IndexEntry]> = entries.into();
        *self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(entries);
    }

    /// Embed and persist `chunks`, or load the persisted copy if one exists.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<BuildOutcome, CopilotError> {
        let _guard = self.build_lock.lock().await;
        let digest = corpus_digest(chunks);

        let manifest = self
            .store
            .manifest(&self.collection)
            .await
            .map_err(CopilotError::Ingestion)?;

        if let Some(manifest) = manifest {
            let reuse = match self.rebuild {
                RebuildPolicy::IfMissing => true,
                RebuildPolicy::IfCorpusChanged => manifest.corpus_digest == digest,
            };
            if reuse {
                info!(
                    collection = %self.collection,
                    location = %self.store.location(),
                    entries = manifest.entry_count,
                    "persisted index found, skipping build"
                );
                let count = self.load_persisted(&manifest).await?;
                return Ok(BuildOutcome::Skipped { chunks: count });
            }
            info!(
                collection = %self.collection,
                stored = %manifest.corpus_digest,
                current = %digest,
                "corpus changed, rebuilding index"
            );
        }

        if chunks.is_empty() {
            return Err(CopilotError::ingestion(anyhow!(
                "no chunks to index for collection '{}'",
                self.collection
            )));
        }

        let entries = self.embed_chunks(chunks).await?;
        let dims = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        let manifest = IndexManifest {
            model: self.embedder.model_name().to_string(),
            dims,
            corpus_digest: digest,
            entry_count: entries.len(),
            built_at: chrono::Utc::now().timestamp(),
        };

        self.store
            .persist(&self.collection, &manifest, &entries)
            .await
            .map_err(CopilotError::Ingestion)?;

        let count = entries.len();
        self.install(entries);
        info!(collection = %self.collection, chunks = count, dims, "index built");
        Ok(BuildOutcome::Built { chunks: count })
    }

    /// Load the persisted collection without touching the corpus.
    pub async fn load(&self) -> Result<usize, CopilotError> {
        let _guard = self.build_lock.lock().await;
        let manifest = self
            .store
            .manifest(&self.collection)
            .await
            .map_err(CopilotError::Ingestion)?
            .ok_or_else(|| {
                CopilotError::ingestion(anyhow!(
                    "no persisted index for collection '{}' at {}",
                    self.collection,
                    self.store.location()
                ))
            })?;
        self.load_persisted(&manifest).await
    }

    async fn load_persisted(&self, manifest: &IndexManifest) -> Result<usize, CopilotError> {
        self.check_compatible(manifest)?;
        let entries = self
            .store
            .load(&self.collection)
            .await
            .map_err(CopilotError::Ingestion)?;
        let count = entries.len();
        if count != manifest.entry_count {
            return Err(CopilotError::ingestion(anyhow!(
                "index at {} lists {} entries but {} were loaded; run `copilot index --rebuild`",
                self.store.location(),
                manifest.entry_count,
                count
            )));
        }
        self.install(entries);
        info!(collection = %self.collection, entries = count, "index loaded");
        Ok(count)
    }

    /// Vectors from a different model or dimensionality cannot be compared
    /// with this embedder's query vectors.
    fn check_compatible(&self, manifest: &IndexManifest) -> Result<(), CopilotError> {
        let model = self.embedder.model_name();
        let dims = self.embedder.dims();
        if manifest.model != model || (dims > 0 && manifest.dims != dims) {
            return Err(CopilotError::ingestion(anyhow!(
                "index at {} was built with model '{}' ({} dims) but the configured embedder is '{}' ({} dims); \
                 run `copilot index --rebuild`",
                self.store.location(),
                manifest.model,
                manifest.dims,
                model,
                dims
            )));
        }
        Ok(())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<IndexEntry>, CopilotError> {
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(CopilotError::Ingestion)?;

            if vectors.len() != batch.len() {
                return Err(CopilotError::ingestion(anyhow!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            debug!(batch = batch_no, size = batch.len(), "embedded batch");

            for (chunk, vector) in batch.iter().zip(vectors) {
                let expected = self.embedder.dims();
                if expected > 0 && vector.len() != expected {
                    return Err(CopilotError::ingestion(anyhow!(
                        "embedder '{}' returned {}-dim vectors but embedding.dims = {}",
                        self.embedder.model_name(),
                        vector.len(),
                        expected
                    )));
                }
                if let Some(first) = entries.first() {
                    if first.vector.len() != vector.len() {
                        return Err(CopilotError::ingestion(anyhow!(
                            "embedder returned vectors of differing dimensionality ({} vs {})",
                            first.vector.len(),
                            vector.len()
                        )));
                    }
                }
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        Ok(entries)
    }

    /// The `k` entries nearest to `text`, nearest first.
    ///
    /// Equal distances keep original chunk order. Returns fewer than `k`
    /// results only when the index holds fewer than `k` entries.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, CopilotError> {
        let entries = self.snapshot().ok_or(CopilotError::IndexNotReady)?;

        let query = self
            .embedder
            .embed_query(text)
            .await
            .map_err(CopilotError::Embedding)?;

        let mut scored: Vec<(f32, &IndexEntry)> = entries
            .iter()
            .map(|entry| (self.distance(&query, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect())
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => l2_distance(a, b),
        }
    }
}

/// SHA-256 over each chunk's source and content hash, in order.
pub fn corpus_digest(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::store::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hashed vectors plus a call counter.
    struct CountingEmbedder {
        inner: HashedEmbedder,
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashedEmbedder::new(128),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            128
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(texts).await
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    /// Every text maps to the same vector.
    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 1.0]).collect())
        }
    }

    fn chunk(i: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("id-{}", i),
            source: "docs/subnet.md".to_string(),
            chunk_index: i,
            text: text.to_string(),
            hash: format!("hash-{}-{}", i, text.len()),
        }
    }

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            chunk(0, "The default gas limit is 8000000 per block."),
            chunk(1, "Validators stake AVAX to secure the primary network."),
            chunk(2, "The fee manager precompile lets admins change fees."),
            chunk(3, "Token allocations assign initial balances in genesis."),
            chunk(4, "Target block rate controls how often blocks are produced."),
        ]
    }

    fn index_with(
        store: Arc<InMemoryVectorStore>,
        embedder: Arc<dyn Embedder>,
        rebuild: RebuildPolicy,
        batch_size: usize,
    ) -> SemanticIndex {
        let config = IndexConfig {
            rebuild,
            ..IndexConfig::default()
        };
        SemanticIndex::new(Box::new(store), embedder, &config, batch_size)
    }

    #[tokio::test]
    async fn test_query_before_build_is_not_ready() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        assert!(!index.is_ready());
        assert!(matches!(
            index.query("gas", 5).await,
            Err(CopilotError::IndexNotReady)
        ));
    }

    #[tokio::test]
    async fn test_build_then_query_finds_relevant_chunk() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        let outcome = index.build(&sample_chunks()).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Built { chunks: 5 });
        assert!(index.is_ready());

        let results = index.query("What is the default gas limit?", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.chunk_index, 0);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_k_larger_than_index_returns_all() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        index.build(&sample_chunks()[..2]).await.unwrap();
        assert_eq!(index.query("anything", 5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_build_skips_embedding() {
        let store = Arc::new(InMemoryVectorStore::new());
        let first_embedder = Arc::new(CountingEmbedder::new());
        let first = index_with(store.clone(), first_embedder.clone(), RebuildPolicy::IfMissing, 2);
        first.build(&sample_chunks()).await.unwrap();
        assert_eq!(first_embedder.calls.load(Ordering::SeqCst), 3);

        let second_embedder = Arc::new(CountingEmbedder::new());
        let second = index_with(store.clone(), second_embedder.clone(), RebuildPolicy::IfMissing, 2);
        let outcome = second.build(&sample_chunks()).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Skipped { chunks: 5 });
        assert_eq!(second_embedder.calls.load(Ordering::SeqCst), 0);
        assert!(second.is_ready());
    }

    #[tokio::test]
    async fn test_if_missing_ignores_corpus_changes() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::new());
        let index = index_with(store.clone(), embedder.clone(), RebuildPolicy::IfMissing, 64);
        index.build(&sample_chunks()[..2]).await.unwrap();

        let again = index_with(store, embedder, RebuildPolicy::IfMissing, 64);
        let outcome = again.build(&sample_chunks()).await.unwrap();
        assert_eq!(outcome, BuildOutcome::Skipped { chunks: 2 });
    }

    #[tokio::test]
    async fn test_if_corpus_changed_rebuilds_on_new_digest() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(CountingEmbedder::new());
        let index = index_with(store.clone(), embedder.clone(), RebuildPolicy::IfCorpusChanged, 64);
        index.build(&sample_chunks()[..2]).await.unwrap();

        let same = index_with(store.clone(), embedder.clone(), RebuildPolicy::IfCorpusChanged, 64);
        assert_eq!(
            same.build(&sample_chunks()[..2]).await.unwrap(),
            BuildOutcome::Skipped { chunks: 2 }
        );

        let changed = index_with(store.clone(), embedder, RebuildPolicy::IfCorpusChanged, 64);
        assert_eq!(
            changed.build(&sample_chunks()).await.unwrap(),
            BuildOutcome::Built { chunks: 5 }
        );
        assert_eq!(store.load("avax_docs").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_is_ingestion_error() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(ShortEmbedder),
            RebuildPolicy::IfMissing,
            64,
        );
        let err = index.build(&sample_chunks()).await.unwrap_err();
        assert!(matches!(err, CopilotError::Ingestion(_)));
        assert!(!index.is_ready());
    }

    #[tokio::test]
    async fn test_empty_chunks_is_ingestion_error() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        assert!(matches!(index.build(&[]).await, Err(CopilotError::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_ties_keep_chunk_order() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(ConstantEmbedder),
            RebuildPolicy::IfMissing,
            64,
        );
        index.build(&sample_chunks()).await.unwrap();
        let results = index.query("anything", 5).await.unwrap();
        let order: Vec<i64> = results.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_load_rejects_other_model() {
        let store = Arc::new(InMemoryVectorStore::new());
        let index = index_with(
            store.clone(),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        index.build(&sample_chunks()).await.unwrap();

        let other = index_with(store, Arc::new(ConstantEmbedder), RebuildPolicy::IfMissing, 64);
        assert!(matches!(other.load().await, Err(CopilotError::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_load_without_persisted_index_fails() {
        let index = index_with(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        assert!(!index.is_persisted().await.unwrap());
        assert!(index.load().await.is_err());
    }

    #[tokio::test]
    async fn test_load_rejects_truncated_entries() {
        let store = Arc::new(InMemoryVectorStore::new());
        let index = index_with(
            store.clone(),
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        index.build(&sample_chunks()).await.unwrap();
        let collection = index.collection().to_string();

        let manifest = store.manifest(&collection).await.unwrap().unwrap();
        let mut entries = store.load(&collection).await.unwrap();
        entries.truncate(3);
        store
            .persist(&collection, &manifest, &entries)
            .await
            .unwrap();

        let reopened = index_with(
            store,
            Arc::new(CountingEmbedder::new()),
            RebuildPolicy::IfMissing,
            64,
        );
        let err = reopened.load().await.unwrap_err();
        assert!(matches!(err, CopilotError::Ingestion(_)));
        assert!(err.to_string().contains("lists 5 entries but 3 were loaded"));
        assert!(!reopened.is_ready());
    }

    #[test]
    fn test_corpus_digest_depends_on_order_and_content() {
        let chunks = sample_chunks();
        let mut reversed = chunks.clone();
        reversed.reverse();
        assert_eq!(corpus_digest(&chunks), corpus_digest(&chunks));
        assert_ne!(corpus_digest(&chunks), corpus_digest(&reversed));
    }
}
