//! Fixed-window character chunker.
//!
//! Splits each normalized [`Document`] into windows of at most `size`
//! characters. Every window after the first starts `size - overlap`
//! characters after its predecessor, so neighbours share exactly `overlap`
//! characters. Windows are cut on `char` boundaries, never inside a UTF-8
//! sequence.
//!
//! A document of `L > overlap` characters yields
//! `ceil((L - overlap) / (size - overlap))` chunks; a non-empty document no
//! longer than `size` yields one; an empty document yields none.
//!
//! Chunk IDs are UUIDv5 values derived from source, index, and text hash,
//! so identical input always produces identical chunks.
//!
//! # Example
//!
//! ```rust
//! use subnet_copilot::chunk::{chunk_documents, ChunkParams};
//! use subnet_copilot::models::Document;
//!
//! let params = ChunkParams::new(10, 4).unwrap();
//! let docs = vec![Document::new("a.md", "abcdefghijklmnop")];
//! let chunks = chunk_documents(&docs, params);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].text, "ghijklmnop");
//! ```

use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Chunk, Document};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be > 0")]
    ZeroSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Validated chunking parameters: `size > 0` and `overlap < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    size: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if size == 0 {
            return Err(ChunkingError::ZeroSize);
        }
        if overlap >= size {
            return Err(ChunkingError::OverlapTooLarge { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.size - self.overlap
    }
}

/// Validate parameters, then chunk. Fails before producing any output.
pub fn chunk(docs: &[Document], size: usize, overlap: usize) -> Result<Vec<Chunk>, ChunkingError> {
    let params = ChunkParams::new(size, overlap)?;
    Ok(chunk_documents(docs, params))
}

/// Chunk every document in order. Document order and provenance are kept.
pub fn chunk_documents(docs: &[Document], params: ChunkParams) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| chunk_text(&doc.source, &doc.text, params))
        .collect()
}

/// Split one text into overlapping windows with contiguous indices from 0.
pub fn chunk_text(source: &str, text: &str, params: ChunkParams) -> Vec<Chunk> {
    // Byte offset of every char start, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    if char_len == 0 {
        return chunks;
    }

    let mut start = 0usize;
    let mut index: i64 = 0;
    loop {
        let end = (start + params.size()).min(char_len);
        chunks.push(make_chunk(source, index, &text[bounds[start]..bounds[end]]));
        if end == char_len {
            break;
        }
        start += params.step();
        index += 1;
    }

    chunks
}

fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}#{}:{}", source, index, hash).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(size, overlap).unwrap()
    }

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        (len - overlap).div_ceil(size - overlap)
    }

    #[test]
    fn test_short_document_single_chunk() {
        let chunks = chunk_text("a.md", "Hello, subnet!", params(1500, 200));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, subnet!");
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        assert!(chunk_text("a.md", "", params(10, 2)).is_empty());
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert_eq!(
            ChunkParams::new(10, 10),
            Err(ChunkingError::OverlapTooLarge {
                size: 10,
                overlap: 10
            })
        );
        assert!(ChunkParams::new(10, 11).is_err());
        assert_eq!(ChunkParams::new(0, 0), Err(ChunkingError::ZeroSize));
        let docs = vec![Document::new("a.md", "abc")];
        assert!(chunk(&docs, 5, 7).is_err());
    }

    #[test]
    fn test_count_size_and_overlap_properties() {
        for size in 2..12usize {
            for overlap in 0..size {
                for len in (overlap + 1)..60 {
                    let text: String = (0..len)
                        .map(|i| char::from(b'a' + (i % 26) as u8))
                        .collect();
                    let chunks = chunk_text("p.md", &text, params(size, overlap));
                    assert_eq!(
                        chunks.len(),
                        expected_count(len, size, overlap),
                        "len={} size={} overlap={}",
                        len,
                        size,
                        overlap
                    );
                    for c in &chunks {
                        assert!(c.text.chars().count() <= size);
                    }
                    for pair in chunks.windows(2) {
                        let prev: Vec<char> = pair[0].text.chars().collect();
                        let next: Vec<char> = pair[1].text.chars().collect();
                        let tail: String = prev[prev.len() - overlap..].iter().collect();
                        let head: String = next[..overlap].iter().collect();
                        assert_eq!(tail, head);
                    }
                }
            }
        }
    }

    #[test]
    fn test_windows_cover_text_in_order() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text("a.md", text, params(10, 3));
        let mut rebuilt = chunks[0].text.clone();
        for c in &chunks[1..] {
            rebuilt.push_str(&c.text[3..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "ÄvälänchéSübnét—gäs";
        let chunks = chunk_text("u.md", text, params(5, 1));
        for c in &chunks {
            assert!(c.text.chars().count() <= 5);
        }
        assert_eq!(chunks.len(), expected_count(text.chars().count(), 5, 1));
    }

    #[test]
    fn test_deterministic() {
        let docs = vec![
            Document::new("a.md", "Alpha beta gamma delta epsilon"),
            Document::new("b.md", "Zeta eta theta"),
        ];
        let c1 = chunk_documents(&docs, params(8, 2));
        let c2 = chunk_documents(&docs, params(8, 2));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_preserves_document_order_and_provenance() {
        let docs = vec![
            Document::new("first.md", "0123456789"),
            Document::new("second.md", "abcdefghij"),
        ];
        let chunks = chunk_documents(&docs, params(6, 2));
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(
            sources,
            vec!["first.md", "first.md", "second.md", "second.md"]
        );
        assert_eq!(chunks[2].chunk_index, 0);
        assert_ne!(chunks[0].id, chunks[2].id);
    }
}
