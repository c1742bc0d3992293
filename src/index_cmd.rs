//! `copilot index` and `copilot search`.

use anyhow::{bail, Result};

use crate::assistant::prepare_index;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::{BuildOutcome, SemanticIndex};
use crate::store::{SqliteVectorStore, VectorStore};

fn open_index(config: &Config) -> Result<SemanticIndex> {
    let embedder = create_embedder(&config.embedding)?;
    let store = SqliteVectorStore::new(&config.index.path);
    Ok(SemanticIndex::new(
        Box::new(store),
        embedder,
        &config.index,
        config.embedding.batch_size,
    ))
}

/// Build the index if needed. `rebuild` first removes the persisted location.
pub async fn run_index(config: &Config, rebuild: bool) -> Result<()> {
    if rebuild {
        SqliteVectorStore::new(&config.index.path).clear().await?;
        println!("index rebuild — cleared {}", config.index.path.display());
    }

    let index = open_index(config)?;
    let outcome = prepare_index(config, &index).await?;

    let chunks = match outcome {
        BuildOutcome::Built { chunks } => {
            println!("index built");
            chunks
        }
        BuildOutcome::Skipped { chunks } => {
            println!("index up to date (build skipped)");
            chunks
        }
    };
    println!("  collection: {}", index.collection());
    println!("  location: {}", index.location());
    println!("  chunks: {}", chunks);

    Ok(())
}

/// Print the `k` nearest chunks to `query` from the persisted index.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        bail!("query must not be empty");
    }

    let index = open_index(config)?;
    if !index.is_persisted().await? {
        bail!(
            "no index at {}; run `copilot index` first",
            config.index.path.display()
        );
    }
    index.load().await?;

    let k = k.unwrap_or(config.retrieval.k);
    let results = index.query(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} #{}",
            i + 1,
            result.distance,
            result.chunk.source,
            result.chunk.chunk_index
        );
        println!("    excerpt: \"{}\"", excerpt(&result.chunk.text, 200));
        println!("    id: {}", result.chunk.id);
        println!();
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &flat[..cut]),
        None => flat.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("a\nb", 10), "a b");
        assert_eq!(excerpt("ééééé", 3), "ééé…");
    }
}
