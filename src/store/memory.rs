use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{IndexEntry, IndexManifest, VectorStore};

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, (IndexManifest, Vec<IndexEntry>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow::anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        Ok(guard.get(collection).map(|(m, _)| m.clone()))
    }

    async fn persist(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let mut guard = self.collections.write().map_err(|_| poisoned())?;
        guard.insert(collection.to_string(), (manifest.clone(), entries.to_vec()));
        Ok(())
    }

    async fn load(&self, collection: &str) -> Result<Vec<IndexEntry>> {
        let guard = self.collections.read().map_err(|_| poisoned())?;
        guard
            .get(collection)
            .map(|(_, entries)| entries.clone())
            .ok_or_else(|| anyhow::anyhow!("collection '{}' is not persisted", collection))
    }

    async fn clear(&self) -> Result<()> {
        self.collections.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn manifest() -> IndexManifest {
        IndexManifest {
            model: "hashed".into(),
            dims: 2,
            corpus_digest: "abc".into(),
            entry_count: 1,
            built_at: 0,
        }
    }

    fn entry() -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: "c0".into(),
                source: "a.md".into(),
                chunk_index: 0,
                text: "hello".into(),
                hash: "h".into(),
            },
            vector: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn test_persist_load_clear() {
        let store = InMemoryVectorStore::new();
        assert!(!store.is_persisted("docs").await.unwrap());
        assert!(store.load("docs").await.is_err());

        store.persist("docs", &manifest(), &[entry()]).await.unwrap();
        assert!(store.is_persisted("docs").await.unwrap());
        assert!(!store.is_persisted("other").await.unwrap());
        assert_eq!(store.load("docs").await.unwrap(), vec![entry()]);

        store.clear().await.unwrap();
        assert!(store.manifest("docs").await.unwrap().is_none());
    }
}
