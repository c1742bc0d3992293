//! Question → top-k context chunks.

use std::sync::Arc;

use crate::error::CopilotError;
use crate::index::SemanticIndex;
use crate::models::{Chunk, ScoredChunk};

#[derive(Clone)]
pub struct Retriever {
    index: Arc<SemanticIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(index: Arc<SemanticIndex>, k: usize) -> Self {
        Self { index, k: k.max(1) }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn index(&self) -> &Arc<SemanticIndex> {
        &self.index
    }

    /// The configured `k` nearest chunks, nearest first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>, CopilotError> {
        Ok(self
            .retrieve_scored(question, self.k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    pub async fn retrieve_scored(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, CopilotError> {
        self.index.query(question, k).await
    }
}
