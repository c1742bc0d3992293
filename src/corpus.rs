use anyhow::{anyhow, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::CopilotError;
use crate::models::Document;

/// Read every matching file under the corpus root, sorted by relative path.
///
/// Fails if the root is missing, a matching file cannot be read as UTF-8, or
/// nothing matches.
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<Document>, CopilotError> {
    scan(config).map_err(CopilotError::Ingestion)
}

fn scan(config: &CorpusConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(anyhow!("corpus root does not exist: {}", root.display()));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs = Vec::new();

    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        // Forward slashes keep sources and chunk ids stable across platforms.
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading corpus file {}", path.display()))?;
        debug!(source = %rel_str, bytes = text.len(), "loaded document");
        docs.push(Document::new(rel_str, text));
    }

    if docs.is_empty() {
        return Err(anyhow!(
            "no documents under {} match {:?}",
            root.display(),
            config.include_globs
        ));
    }

    docs.sort_by(|a, b| a.source.cmp(&b.source));
    info!(root = %root.display(), documents = docs.len(), "corpus loaded");

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob '{}'", pattern))?);
    }
    Ok(builder.build()?)
}
