use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index tables if they do not exist. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per collection; its presence marks the collection as complete.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            collection TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            corpus_digest TEXT NOT NULL,
            entry_count INTEGER NOT NULL,
            built_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            collection TEXT NOT NULL,
            position INTEGER NOT NULL,
            chunk_id TEXT NOT NULL,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (collection, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_entries_chunk_id ON index_entries(chunk_id)")
        .execute(pool)
        .await?;

    Ok(())
}
