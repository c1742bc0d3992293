//! Typed failure kinds surfaced by the answering pipeline.
//!
//! Only [`CopilotError::Ingestion`] is fatal to the process. Every other
//! variant is a per-request failure that leaves the shared index usable.

use thiserror::Error;

use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum CopilotError {
    /// Corpus loading, normalization, chunking, or index build failed at startup.
    #[error("ingestion failed: {0:#}")]
    Ingestion(#[source] anyhow::Error),

    /// Retrieval was attempted before the index was built or loaded.
    #[error("semantic index is not ready")]
    IndexNotReady,

    /// The attempt ceiling was reached without a parseable model response.
    #[error("generation exhausted after {attempts} attempts; last error: {last}")]
    GenerationExhausted { attempts: u32, last: ValidationError },

    /// The language model backend could not be invoked.
    #[error("generator unavailable: {0:#}")]
    Generator(#[source] anyhow::Error),

    /// The embedding backend failed while embedding a query.
    #[error("embedding backend unavailable: {0:#}")]
    Embedding(#[source] anyhow::Error),

    /// Reading the persisted index failed.
    #[error("index storage error: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl CopilotError {
    pub fn ingestion(err: impl Into<anyhow::Error>) -> Self {
        Self::Ingestion(err.into())
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ingestion(_) => "ingestion_failed",
            Self::IndexNotReady => "service_unavailable",
            Self::GenerationExhausted { .. } => "generation_exhausted",
            Self::Generator(_) | Self::Embedding(_) => "model_unavailable",
            Self::Storage(_) => "internal",
        }
    }

    /// Whether the process must stop serving after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Ingestion(_))
    }
}
