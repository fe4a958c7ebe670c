//! Retrying HTTP client for the inference backend.
//!
//! One logical call hides transient 503s behind a fixed-interval retry loop;
//! every other failure is terminal and classified for the caller.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use super::error::EmbedError;
use super::payload::InferencePayload;

/// Fixed-interval retry policy for transient backend unavailability.
///
/// The backend's failure mode is a slow, predictable model cold start, so the
/// policy is a flat wait between attempts rather than exponential backoff
/// with jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRetry {
    /// Total number of sends, including the first.
    pub attempts: u32,
    /// Wait between an unavailable response and the next send.
    pub backoff: Duration,
}

impl Default for FixedRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_secs(30),
        }
    }
}

impl FixedRetry {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Client for the remote inference backend.
///
/// Stateless beyond its configuration; safe to share behind an `Arc`.
pub struct EmbedderClient {
    http: reqwest::Client,
    url: String,
    api_token: String,
    retry: FixedRetry,
}

impl EmbedderClient {
    pub fn new(url: impl Into<String>, api_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            url: url.into(),
            api_token: api_token.into(),
            retry: FixedRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: FixedRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Perform one logical embedding call.
    ///
    /// A 503 triggers the fixed backoff and another send, up to the attempt
    /// budget; exhausting the budget is reported as its own failure so
    /// callers can tell "gave up after retries" from a one-shot error. Any
    /// other non-2xx status and any transport failure is terminal on the
    /// first occurrence. The backoff suspends only the calling task.
    pub async fn embed(&self, payload: &InferencePayload) -> Result<Vec<f32>, EmbedError> {
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            let response = self
                .http
                .post(&self.url)
                .header(ACCEPT, "application/json")
                .bearer_auth(&self.api_token)
                .json(payload)
                .send()
                .await
                .map_err(EmbedError::Transport)?;

            let status = response.status();
            if status == StatusCode::SERVICE_UNAVAILABLE {
                if attempt < attempts {
                    warn!(
                        attempt,
                        backoff_secs = self.retry.backoff.as_secs_f64(),
                        "backend unavailable, backing off before retry"
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                    continue;
                }
                return Err(EmbedError::RetriesExhausted { attempts });
            }
            if !status.is_success() {
                let reason = response.text().await.unwrap_or_default();
                return Err(EmbedError::Http { status, reason });
            }

            // read the body before parsing so a connection dropped mid-body
            // stays a transport failure, not a contract one
            let raw = response.text().await.map_err(EmbedError::Transport)?;
            let body: Value = serde_json::from_str(&raw)
                .map_err(|err| EmbedError::Decode(format!("invalid JSON body: {err}")))?;
            return extract_embedding(body);
        }
        Err(EmbedError::RetriesExhausted { attempts })
    }
}

/// Pull the `embeddings` field out of a decoded backend response.
///
/// Accepts a flat numeric array or an array of arrays flattened in call
/// order. A missing or mistyped field is a decode failure, never a
/// zero-filled default.
fn extract_embedding(body: Value) -> Result<Vec<f32>, EmbedError> {
    let Value::Object(mut map) = body else {
        return Err(EmbedError::Decode("response body is not a JSON object".into()));
    };
    let embeddings = map
        .remove("embeddings")
        .ok_or_else(|| EmbedError::Decode("missing `embeddings` field".into()))?;
    let Value::Array(items) = embeddings else {
        return Err(EmbedError::Decode("`embeddings` is not an array".into()));
    };

    let mut vector = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(inner) => {
                for entry in inner {
                    vector.push(number_entry(entry)?);
                }
            }
            other => vector.push(number_entry(other)?),
        }
    }
    Ok(vector)
}

fn number_entry(entry: Value) -> Result<f32, EmbedError> {
    match entry {
        Value::Number(num) => {
            let value = num
                .as_f64()
                .ok_or_else(|| EmbedError::Decode("non-finite embedding value".into()))?;
            if !value.is_finite() {
                return Err(EmbedError::Decode("non-finite embedding value".into()));
            }
            Ok(value as f32)
        }
        other => Err(EmbedError::Decode(format!(
            "embedding entries must be numbers, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_policy_is_five_attempts_thirty_seconds() {
        let retry = FixedRetry::default();
        assert_eq!(retry.attempts, 5);
        assert_eq!(retry.backoff, Duration::from_secs(30));
    }

    #[test]
    fn retry_builders_override_the_defaults() {
        let retry = FixedRetry::default()
            .with_attempts(2)
            .with_backoff(Duration::from_millis(10));
        assert_eq!(retry.attempts, 2);
        assert_eq!(retry.backoff, Duration::from_millis(10));
    }

    #[test]
    fn extracts_a_flat_numeric_array() {
        let vector = extract_embedding(json!({"embeddings": [0.5, -1.25, 2.0]})).unwrap();
        assert_eq!(vector, vec![0.5, -1.25, 2.0]);
    }

    #[test]
    fn flattens_nested_arrays_in_order() {
        let vector =
            extract_embedding(json!({"embeddings": [[1.0, 2.0], [3.0, 4.0]]})).unwrap();
        assert_eq!(vector, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn missing_field_is_a_decode_error() {
        let err = extract_embedding(json!({"outputs": [1.0]})).unwrap_err();
        assert!(matches!(err, EmbedError::Decode(msg) if msg.contains("embeddings")));
    }

    #[test]
    fn mistyped_entries_are_a_decode_error_not_a_default() {
        let err = extract_embedding(json!({"embeddings": [1.0, "oops"]})).unwrap_err();
        assert!(matches!(err, EmbedError::Decode(_)));
    }

    #[test]
    fn non_object_body_is_a_decode_error() {
        let err = extract_embedding(json!([1.0, 2.0])).unwrap_err();
        assert!(matches!(err, EmbedError::Decode(_)));
    }
}
