//! Persistence seam for the semantic index.
//!
//! A [`VectorStore`] saves and restores the embedded chunks of a named
//! collection. The store decides *where* an index lives; the
//! [`SemanticIndex`](crate::index::SemanticIndex) decides *when* to build.
//!
//! Implementations:
//! - [`SqliteVectorStore`]: a directory holding `index.sqlite`, written
//!   through a staging directory so a half-written index never looks complete.
//! - [`InMemoryVectorStore`]: process-local, for tests and one-shot runs.

mod memory;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Chunk;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// An embedded chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// What a persisted collection was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub model: String,
    pub dims: usize,
    /// SHA-256 over the chunk hashes in index order.
    pub corpus_digest: String,
    pub entry_count: usize,
    /// Unix seconds.
    pub built_at: i64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Human-readable location, for logs.
    fn location(&self) -> String;

    /// Manifest of a completely persisted collection, or `None` if absent.
    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>>;

    /// Replace `collection` with `entries`. Either all entries and the
    /// manifest become visible, or none do.
    async fn persist(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<()>;

    /// Entries of `collection` in the order they were persisted.
    async fn load(&self, collection: &str) -> Result<Vec<IndexEntry>>;

    /// Remove everything at this location.
    async fn clear(&self) -> Result<()>;

    async fn is_persisted(&self, collection: &str) -> Result<bool> {
        Ok(self.manifest(collection).await?.is_some())
    }
}

/// Lets several indexes (or a test and an index) share one store.
#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for std::sync::Arc<T> {
    fn location(&self) -> String {
        (**self).location()
    }

    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>> {
        (**self).manifest(collection).await
    }

    async fn persist(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<()> {
        (**self).persist(collection, manifest, entries).await
    }

    async fn load(&self, collection: &str) -> Result<Vec<IndexEntry>> {
        (**self).load(collection).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}
