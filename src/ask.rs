//! `copilot ask`: one answer from the command line.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::models::AnswerRequest;

/// Answer `question` and print the `{reply, update}` object as JSON.
///
/// `config_json` names a file holding the current subnet configuration
/// (defaults to `{}`); `history` names a plain-text chat transcript.
pub async fn run_ask(
    config: &Config,
    question: &str,
    config_json: Option<&Path>,
    history: Option<&Path>,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }

    let current_config = match config_json {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            if !value.is_object() {
                bail!("{} must contain a JSON object", path.display());
            }
            value
        }
        None => serde_json::json!({}),
    };

    let chat_history = match history {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let assistant = Assistant::from_config(config).await?;
    let request = AnswerRequest::new(chat_history, current_config, question);
    let answer = assistant.answer_with_attempts(&request).await?;

    println!("{}", serde_json::to_string_pretty(&answer.result)?);
    Ok(())
}
