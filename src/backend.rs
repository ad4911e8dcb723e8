//! HTTP plumbing shared by the embedding and generation providers.
//!
//! Every remote backend call goes through [`post_json`], which applies the
//! same retry rules:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// A backend call that ran out of attempts or hit a permanent error.
///
/// The message never contains the request URL, so credentials carried in
/// headers or query strings cannot reach logs or HTTP error bodies.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BackendFailure(pub String);

/// Request parameters for one backend call.
pub struct JsonRequest<'a> {
    /// Short backend name used in messages, e.g. `"OpenAI"`.
    pub label: &'a str,
    pub url: String,
    pub bearer: Option<&'a str>,
    /// Extra header such as `("x-goog-api-key", key)`.
    pub header: Option<(&'a str, &'a str)>,
    pub body: &'a Value,
    pub max_retries: u32,
    pub base_delay: Duration,
}

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, BackendFailure> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BackendFailure(format!("failed to build HTTP client: {e}")))
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff(base: Duration, attempt: u32) -> Duration {
    base * (1u32 << (attempt.saturating_sub(1)).min(5))
}

/// POST a JSON body and return the parsed JSON response.
pub async fn post_json(
    client: &reqwest::Client,
    req: JsonRequest<'_>,
) -> Result<Value, BackendFailure> {
    let mut last_err = None;

    for attempt in 0..=req.max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(req.base_delay, attempt)).await;
        }

        let mut builder = client.post(&req.url).json(req.body);
        if let Some(token) = req.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some((name, value)) = req.header {
            builder = builder.header(name, value);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        BackendFailure(format!(
                            "{} returned invalid JSON: {}",
                            req.label,
                            e.without_url()
                        ))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = format!("{} API error {}: {}", req.label, status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(backend = req.label, attempt, %status, "transient backend error");
                    last_err = Some(err);
                    continue;
                }
                return Err(BackendFailure(err));
            }
            Err(e) => {
                let e = e.without_url();
                warn!(backend = req.label, attempt, error = %e, "backend request failed");
                last_err = Some(format!("{} connection error: {}", req.label, e));
            }
        }
    }

    Err(BackendFailure(last_err.unwrap_or_else(|| {
        format!("{} request failed after retries", req.label)
    })))
}

/// Read `name` from the environment, failing with a readable message.
pub fn api_key(name: &str) -> Result<String, BackendFailure> {
    std::env::var(name).map_err(|_| BackendFailure(format!("{name} environment variable not set")))
}
