//! JSON-over-HTTP calls with exponential backoff, shared by the embedding
//! and generation backends.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Build a client; `timeout_secs = None` leaves requests unbounded.
pub(crate) fn build_client(timeout_secs: Option<u64>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// `service` names the backend in errors and logs (e.g. `"Ollama"`).
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(service, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    warn!(service, %status, attempt, "transient API error");
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        service,
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                warn!(service, attempt, error = %e, "connection error");
                last_err = Some(anyhow::anyhow!(
                    "{} connection error (is it reachable at {}?): {}",
                    service,
                    url,
                    e
                ));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(12), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_service() {
        let client = build_client(Some(1)).unwrap();
        let err = post_json(
            &client,
            "http://127.0.0.1:9/api/embed",
            None,
            &serde_json::json!({}),
            0,
            "Ollama",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Ollama"));
    }
}
