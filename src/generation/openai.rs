//! OpenAI-compatible chat completions backend (`POST /v1/chat/completions`).
//!
//! Requires `OPENAI_API_KEY`. Set `[generation].url` to target a compatible
//! server instead of api.openai.com.

use anyhow::Result;
use async_trait::async_trait;

use super::{chat_messages, Generator};
use crate::config::GenerationConfig;
use crate::prompt::Prompt;
use crate::transport;

pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: String,
    temperature: Option<f32>,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
            max_retries: config.transport_retries,
            client: transport::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": chat_messages(prompt),
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        let json = transport::post_json(
            &self.client,
            &format!("{}/v1/chat/completions", self.url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}
