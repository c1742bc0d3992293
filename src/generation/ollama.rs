//! Ollama chat backend (`POST /api/chat`, non-streaming).

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{chat_messages, Generator};
use crate::config::GenerationConfig;
use crate::prompt::Prompt;
use crate::transport;

pub struct OllamaGenerator {
    model: String,
    url: String,
    num_ctx: u32,
    temperature: Option<f32>,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            num_ctx: config.num_ctx,
            temperature: config.temperature,
            max_retries: config.transport_retries,
            client: transport::build_client(config.timeout_secs)?,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut options = serde_json::json!({ "num_ctx": self.num_ctx });
        if let Some(t) = self.temperature {
            options["temperature"] = serde_json::json!(t);
        }
        serde_json::json!({
            "model": self.model,
            "messages": chat_messages(prompt),
            "stream": false,
            "options": options,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let json = transport::post_json(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &self.request_body(prompt),
            self.max_retries,
            "Ollama",
        )
        .await?;
        let content = parse_chat_response(&json)?;
        debug!(model = %self.model, chars = content.len(), "ollama response received");
        Ok(content)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
}
