//! Shared JSON-over-HTTP plumbing for the embedding and language model providers.
//!
//! Retry strategy (only when `max_retries > 0`):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use tracing::{debug, warn};

/// Build a client with the provider's request timeout.
pub(crate) fn client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("policy-assistant/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// Errors are returned as display strings; callers wrap them in the
/// provider-specific [`RagError`](crate::error::RagError) variant.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value, String> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            warn!(url, attempt, delay_secs = delay.as_secs(), "retrying provider call");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        debug!(url, attempt, "sending provider request");

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| format!("invalid JSON response: {}", e));
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(format!("API error {}: {}", status, body_text));
                    continue;
                }

                // Client error (not 429): fail now
                return Err(format!("API error {}: {}", status, body_text));
            }
            Err(e) => {
                last_err = Some(format!("connection error ({}): {}", url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| "request failed after retries".to_string()))
}
