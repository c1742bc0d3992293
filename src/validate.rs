//! Structured-output validation.
//!
//! Turns raw model text into a [`StructuredResult`] or a [`ValidationError`].
//! Accepted shapes, tried in order:
//!
//! 1. the whole text is a JSON object;
//! 2. a Markdown code fence (```` ```json ```` or bare ```` ``` ````) whose body is an object;
//! 3. each top-level balanced `{ ... }` span in the text, left to right.
//!
//! The first candidate carrying `reply` (string) and `update` (object) is
//! returned; other keys are ignored. Objects nested inside a span are never
//! candidates, so nothing is salvaged from the interior of malformed JSON.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::StructuredResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("missing required key '{0}'")]
    MissingKey(&'static str),
    #[error("key '{key}' must be {expected}, found {found}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredOutputValidator;

impl StructuredOutputValidator {
    pub fn new() -> Self {
        Self
    }

    /// The first candidate that satisfies the required keys wins. When none
    /// does, the error from the earliest candidate is reported.
    pub fn parse(&self, raw: &str) -> Result<StructuredResult, ValidationError> {
        let trimmed = raw.trim();
        let mut first_error = None;

        let mut candidates: Vec<&str> = vec![trimmed];
        candidates.extend(fenced_blocks(trimmed));

        for candidate in candidates {
            let candidate = candidate.trim();
            match check_candidate(candidate) {
                Some(Ok(result)) => return Ok(result),
                // Prose that is not JSON at all is not an error yet.
                Some(Err(e)) if candidate.starts_with('{') => {
                    first_error.get_or_insert(e);
                }
                Some(Err(_)) => {}
                None => {}
            }
        }

        // Only top-level spans are candidates. A span that fails is skipped
        // as a whole; objects nested inside it are never tried on their own.
        let mut start = 0;
        while let Some(offset) = trimmed[start..].find('{') {
            let open = start + offset;
            let Some(len) = balanced_end(&trimmed[open..]) else {
                first_error.get_or_insert_with(|| {
                    ValidationError::Malformed("unbalanced braces".to_string())
                });
                break;
            };
            match check_candidate(&trimmed[open..open + len]) {
                Some(Ok(result)) => return Ok(result),
                Some(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                None => {}
            }
            start = open + len;
        }

        Err(first_error.unwrap_or(ValidationError::NoJsonObject))
    }
}

/// `None` when `text` is valid JSON but not an object.
fn check_candidate(text: &str) -> Option<Result<StructuredResult, ValidationError>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(to_result(map)),
        Ok(_) => None,
        Err(e) => Some(Err(ValidationError::Malformed(e.to_string()))),
    }
}

/// Bodies of ``` fences, in order of appearance.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        // Skip the info string (e.g. "json") up to the end of the line.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
        let body = &after[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Byte length of the balanced object starting at `text[0] == '{'`,
/// skipping braces inside JSON strings.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn to_result(mut object: Map<String, Value>) -> Result<StructuredResult, ValidationError> {
    let reply = match object.remove("reply") {
        None => return Err(ValidationError::MissingKey("reply")),
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(ValidationError::WrongType {
                key: "reply",
                expected: "string",
                found: type_name(&other),
            })
        }
    };
    let update = match object.remove("update") {
        None => return Err(ValidationError::MissingKey("update")),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ValidationError::WrongType {
                key: "update",
                expected: "object",
                found: type_name(&other),
            })
        }
    };
    Ok(StructuredResult { reply, update })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
