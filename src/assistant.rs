//! Startup lifecycle and the per-request `answer` operation.
//!
//! ```text
//! initialize:  persisted? ──yes──► load
//!                 │no
//!                 ▼
//!              load_corpus ─► normalize ─► chunk ─► build
//!
//! answer:      retrieve(k) ─► assemble ─► orchestrate ─► {reply, update}
//! ```
//!
//! An [`Assistant`] is immutable once built and shared across requests
//! behind an `Arc`; nothing about one request carries into the next.

use std::sync::Arc;
use tracing::info;

use crate::chunk::chunk;
use crate::config::{Config, RebuildPolicy};
use crate::corpus::load_corpus;
use crate::embedding::{create_embedder, Embedder};
use crate::error::CopilotError;
use crate::generation::{create_generator, Generator};
use crate::index::{BuildOutcome, SemanticIndex};
use crate::models::{AnswerRequest, Chunk, Document, StructuredResult};
use crate::normalize::normalize;
use crate::orchestrator::{Answer, Orchestrator};
use crate::prompt::PromptAssembler;
use crate::retrieve::Retriever;
use crate::store::{SqliteVectorStore, VectorStore};

/// Load, normalize, and chunk the corpus.
pub fn ingest(config: &Config) -> Result<Vec<Chunk>, CopilotError> {
    let docs = load_corpus(&config.corpus)?;
    let normalized: Vec<Document> = docs.iter().map(normalize).collect();
    let chunks = chunk(&normalized, config.chunking.size, config.chunking.overlap)
        .map_err(CopilotError::ingestion)?;
    info!(
        documents = normalized.len(),
        chunks = chunks.len(),
        size = config.chunking.size,
        overlap = config.chunking.overlap,
        "corpus chunked"
    );
    Ok(chunks)
}

/// Make `index` ready: load it when a persisted copy exists and the policy
/// allows reuse without reading the corpus, otherwise ingest and build.
pub async fn prepare_index(
    config: &Config,
    index: &SemanticIndex,
) -> Result<BuildOutcome, CopilotError> {
    if index.rebuild_policy() == RebuildPolicy::IfMissing
        && index.is_persisted().await.map_err(CopilotError::ingestion)?
    {
        info!(
            collection = index.collection(),
            location = %index.location(),
            "persisted index exists, skipping corpus ingestion"
        );
        let chunks = index.load().await?;
        return Ok(BuildOutcome::Skipped { chunks });
    }

    let chunks = ingest(config)?;
    index.build(&chunks).await
}

pub struct Assistant {
    index: Arc<SemanticIndex>,
    retriever: Retriever,
    assembler: PromptAssembler,
    orchestrator: Orchestrator,
}

impl Assistant {
    /// Build or load the index, then wire the request pipeline.
    pub async fn initialize(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        store: Box<dyn VectorStore>,
    ) -> Result<Self, CopilotError> {
        config.validate().map_err(CopilotError::Ingestion)?;

        let index = Arc::new(SemanticIndex::new(
            store,
            embedder,
            &config.index,
            config.embedding.batch_size,
        ));
        let outcome = prepare_index(config, &index).await?;
        info!(?outcome, generator = generator.model_name(), "assistant ready");

        Ok(Self::with_index(config, index, generator))
    }

    /// Wire the pipeline around an index that is already ready.
    pub fn with_index(
        config: &Config,
        index: Arc<SemanticIndex>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            retriever: Retriever::new(index.clone(), config.retrieval.k),
            assembler: PromptAssembler::new(
                config.prompt.persona.clone(),
                config.prompt.include_config_fields,
            ),
            orchestrator: Orchestrator::new(generator, config.generation.max_attempts),
            index,
        }
    }

    /// Providers and the SQLite store from config.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let store = Box::new(SqliteVectorStore::new(&config.index.path));
        Ok(Self::initialize(config, embedder, generator, store).await?)
    }

    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    pub async fn answer(&self, request: &AnswerRequest) -> Result<StructuredResult, CopilotError> {
        Ok(self.answer_with_attempts(request).await?.result)
    }

    /// Like [`answer`](Self::answer), also reporting how many generator calls it took.
    pub async fn answer_with_attempts(&self, request: &AnswerRequest) -> Result<Answer, CopilotError> {
        let context = self.retriever.retrieve(&request.question).await?;
        let prompt = self.assembler.assemble(
            &context,
            &request.chat_history,
            &request.current_config,
            &request.question,
        );
        self.orchestrator.run(&prompt).await
    }
}
