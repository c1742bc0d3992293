//! SQLite-backed [`VectorStore`].
//!
//! Layout on disk:
//!
//! ```text
//! <path>/index.sqlite          complete, committed index
//! <path>.partial/index.sqlite  first build in progress (never read)
//! ```
//!
//! The first build of a location is written under `<path>.partial` and the
//! directory is renamed onto `<path>` only after the transaction commits.
//! Later builds write into the live database inside one transaction; a
//! collection's `index_meta` row is inserted in that same transaction, so it
//! only exists for fully written collections.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{IndexEntry, IndexManifest, VectorStore};
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::migrate;
use crate::models::Chunk;

const DB_FILE: &str = "index.sqlite";

pub struct SqliteVectorStore {
    root: PathBuf,
}

impl SqliteVectorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn db_file(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    fn staging_dir(&self) -> PathBuf {
        let mut name = OsString::from(self.root.as_os_str());
        name.push(".partial");
        PathBuf::from(name)
    }

    async fn open_existing(&self) -> Result<Option<SqlitePool>> {
        let db_file = self.db_file();
        if !db_file.is_file() {
            return Ok(None);
        }
        let pool = db::connect(&db_file, false)
            .await
            .with_context(|| format!("opening {}", db_file.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Some(pool))
    }
}

async fn write_collection(
    pool: &SqlitePool,
    collection: &str,
    manifest: &IndexManifest,
    entries: &[IndexEntry],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM index_entries WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM index_meta WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;

    for (position, entry) in entries.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO index_entries
                (collection, position, chunk_id, source, chunk_index, text, hash, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(position as i64)
        .bind(&entry.chunk.id)
        .bind(&entry.chunk.source)
        .bind(entry.chunk.chunk_index)
        .bind(&entry.chunk.text)
        .bind(&entry.chunk.hash)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO index_meta (collection, model, dims, corpus_digest, entry_count, built_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(collection)
    .bind(&manifest.model)
    .bind(manifest.dims as i64)
    .bind(&manifest.corpus_digest)
    .bind(entries.len() as i64)
    .bind(manifest.built_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn manifest(&self, collection: &str) -> Result<Option<IndexManifest>> {
        let Some(pool) = self.open_existing().await? else {
            return Ok(None);
        };

        let row = sqlx::query(
            "SELECT model, dims, corpus_digest, entry_count, built_at FROM index_meta WHERE collection = ?",
        )
        .bind(collection)
        .fetch_optional(&pool)
        .await?;
        pool.close().await;

        Ok(row.map(|row| {
            let dims: i64 = row.get("dims");
            let entry_count: i64 = row.get("entry_count");
            IndexManifest {
                model: row.get("model"),
                dims: dims as usize,
                corpus_digest: row.get("corpus_digest"),
                entry_count: entry_count as usize,
                built_at: row.get("built_at"),
            }
        }))
    }

    async fn persist(
        &self,
        collection: &str,
        manifest: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<()> {
        if let Some(pool) = self.open_existing().await? {
            debug!(location = %self.root.display(), collection, "writing into existing index");
            let result = write_collection(&pool, collection, manifest, entries).await;
            pool.close().await;
            return result;
        }

        let staging = self.staging_dir();
        if staging.exists() {
            debug!(path = %staging.display(), "removing stale staging directory");
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        let pool = db::connect(&staging.join(DB_FILE), true).await?;
        migrate::run_migrations(&pool).await?;
        let result = write_collection(&pool, collection, manifest, entries).await;
        pool.close().await;
        result?;

        if self.root.exists() {
            // Only an empty directory may be replaced.
            std::fs::remove_dir(&self.root).with_context(|| {
                format!(
                    "{} exists but is not an index; remove it or choose another [index].path",
                    self.root.display()
                )
            })?;
        }
        if let Some(parent) = self.root.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::rename(&staging, &self.root)?;
        info!(location = %self.root.display(), collection, entries = entries.len(), "index persisted");
        Ok(())
    }

    async fn load(&self, collection: &str) -> Result<Vec<IndexEntry>> {
        let Some(pool) = self.open_existing().await? else {
            bail!("no index at {}", self.root.display());
        };

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, source, chunk_index, text, hash, vector
            FROM index_entries
            WHERE collection = ?
            ORDER BY position
            "#,
        )
        .bind(collection)
        .fetch_all(&pool)
        .await?;
        pool.close().await;

        let entries = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                IndexEntry {
                    chunk: Chunk {
                        id: row.get("chunk_id"),
                        source: row.get("source"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                    vector: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(entries)
    }

    async fn clear(&self) -> Result<()> {
        for dir in [self.root.clone(), self.staging_dir()] {
            if dir.exists() {
                info!(path = %dir.display(), "removing persisted index");
                std::fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}
