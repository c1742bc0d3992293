//! Language model backends.
//!
//! A [`Generator`] turns one [`Prompt`] into raw text. It knows nothing about
//! the output contract; validation and retrying live in the orchestrator.
//! Transport retries (429, 5xx, connection errors) happen inside a single
//! [`Generator::generate`] call.
//!
//! | Config Value | Backend |
//! |-------------|----------|
//! | `"disabled"` | [`DisabledGenerator`] |
//! | `"ollama"` | [`OllamaGenerator`] |
//! | `"openai"` | [`OpenAIGenerator`] |

mod ollama;
mod openai;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::prompt::Prompt;

pub use ollama::OllamaGenerator;
pub use openai::OpenAIGenerator;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    /// One invocation of the model.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// Chat messages in the `[{role, content}]` shape both backends accept.
pub(crate) fn chat_messages(prompt: &Prompt) -> serde_json::Value {
    serde_json::json!([
        { "role": "system", "content": prompt.system },
        { "role": "user", "content": prompt.user },
    ])
}
