//! Corpus normalizer.
//!
//! Strips inline Markdown image references (`![alt](target)`) and a leading
//! `---`-fenced metadata header. The rewrite is repeated until the text stops
//! changing, which makes [`normalize`] idempotent even for inputs where one
//! removal exposes another match (e.g. `!![a](b)[c](d)`).

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Document;

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"!\[.*?\]\(.*?\)").expect("image pattern is valid"))
}

fn front_matter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\A---.*?---\s*").expect("front matter pattern is valid"))
}

/// Return a new document with non-text artifacts removed. Provenance is kept.
pub fn normalize(doc: &Document) -> Document {
    Document {
        source: doc.source.clone(),
        text: normalize_text(&doc.text),
    }
}

pub fn normalize_text(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_once(&current);
        // Every effective rewrite removes at least three bytes, so this terminates.
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str) -> String {
    let without_header = front_matter_pattern().replace(text, "");
    image_pattern()
        .replace_all(&without_header, "")
        .into_owned()
}
