//! Core data types that flow through ingestion, retrieval, and answering.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A corpus file's text plus its origin path (relative to the corpus root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A window of a normalized document; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Origin path of the parent document.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk returned from a similarity query, with its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Lower is nearer. Cosine distance (`1 - similarity`) or Euclidean distance.
    pub distance: f32,
}

/// The only contractually-typed output: a reply and a JSON merge-patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub reply: String,
    /// Empty map means "no change".
    pub update: Map<String, Value>,
}

/// Per-request conversation state. Nothing here outlives the request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerRequest {
    #[serde(default, alias = "chatHistory")]
    pub chat_history: String,
    #[serde(default = "empty_object", alias = "user_config", alias = "currentConfig")]
    pub current_config: Value,
    pub question: String,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl AnswerRequest {
    pub fn new(chat_history: impl Into<String>, current_config: Value, question: impl Into<String>) -> Self {
        Self {
            chat_history: chat_history.into(),
            current_config,
            question: question.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_accepts_wire_aliases() {
        let snake: AnswerRequest = serde_json::from_value(json!({
            "chat_history": "User: hi",
            "user_config": {"gasLimit": 8000000},
            "question": "What is the gas limit?"
        }))
        .unwrap();
        let camel: AnswerRequest = serde_json::from_value(json!({
            "chatHistory": "User: hi",
            "currentConfig": {"gasLimit": 8000000},
            "question": "What is the gas limit?"
        }))
        .unwrap();
        assert_eq!(snake, camel);
        assert_eq!(snake.current_config["gasLimit"], 8000000);
    }

    #[test]
    fn test_request_defaults_history_and_config() {
        let req: AnswerRequest = serde_json::from_value(json!({"question": "hi"})).unwrap();
        assert_eq!(req.chat_history, "");
        assert_eq!(req.current_config, json!({}));
    }

    #[test]
    fn test_structured_result_serializes_two_fields() {
        let result = StructuredResult {
            reply: "8000000".to_string(),
            update: Map::new(),
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"reply": "8000000", "update": {}})
        );
    }
}
