//! Shared HTTP plumbing for upstream model APIs.
//!
//! Both the embedding and completion providers talk JSON over HTTP and use
//! the same retry policy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;

/// Build a client whose every request is bounded by `timeout_secs`.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Upper bound for a whole [`post_json_with_retry`] call: every attempt
/// running into the per-request timeout plus every backoff sleep.
///
/// Callers wrapping a provider call in `tokio::time::timeout` use this so
/// the wrapper never cuts the retry loop short.
pub fn call_budget(timeout_secs: u64, max_retries: u32) -> Duration {
    let attempts = Duration::from_secs(timeout_secs) * (max_retries + 1);
    (1..=max_retries).map(backoff).fold(attempts, |total, delay| total + delay)
}

/// POST `body` to `url` and return the parsed JSON response, retrying
/// transient failures up to `max_retries` times.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            tracing::debug!(label, attempt, delay_secs = delay.as_secs(), "retrying upstream call");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} call failed after retries", label)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_call_budget_covers_attempts_and_backoff() {
        assert_eq!(call_budget(30, 0), Duration::from_secs(30));
        // 4 attempts of 2s plus 1s + 2s + 4s of backoff.
        assert_eq!(call_budget(2, 3), Duration::from_secs(15));
        // Backoff is capped at 32s.
        assert_eq!(call_budget(1, 7), Duration::from_secs(8 + 1 + 2 + 4 + 8 + 16 + 32 + 32));
    }

    /// First request is slow and answers 503, later ones succeed.
    async fn flaky(State(hits): State<Arc<AtomicUsize>>) -> axum::response::Response {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
        }
        Json(json!({ "ok": true })).into_response()
    }

    #[tokio::test]
    async fn test_slow_503_is_retried_within_call_budget() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/v1/embeddings", post(flaky))
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/embeddings", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let timeout_secs = 2;
        let max_retries = 5;
        let client = client(timeout_secs).unwrap();
        let body = json!({ "input": ["hello"] });
        let result = tokio::time::timeout(
            call_budget(timeout_secs, max_retries),
            post_json_with_retry(&client, &url, None, &body, max_retries, "Test"),
        )
        .await
        .expect("retry loop was cut short by the call budget")
        .unwrap();

        assert_eq!(result["ok"], true);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v1/embeddings",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, "bad input")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/embeddings", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = client(2).unwrap();
        let err = post_json_with_retry(&client, &url, None, &json!({}), 3, "Test")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
