use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CommonError;

/// Upper bound on retries for a single request. One retry keeps a hung upstream from
/// stalling a request for more than two attempt timeouts.
pub const MAX_RETRIES_CAP: u32 = 1;

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl OpenAiClientConfig {
    /// Build the config from an arbitrary variable lookup. Unparseable values fall back to
    /// their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let base_url =
            var("OPENAI_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let api_key = var("OPENAI_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let default_timeout = var("OPENAI_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(10));

        let max_retries = var("OPENAI_MAX_RETRIES")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(MAX_RETRIES_CAP)
            .min(MAX_RETRIES_CAP);

        let initial_backoff = var("OPENAI_RETRY_INITIAL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(200));

        let max_backoff = var("OPENAI_RETRY_MAX_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(2_000));

        let max_error_body_bytes = var("OPENAI_MAX_ERROR_BODY_BYTES")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_timeout,
            max_retries,
            initial_backoff,
            max_backoff,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

impl OpenAiClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, OpenAiClientError::Request(e) if e.is_timeout())
    }

    /// Fold transport detail into the shared fallback taxonomy. `timeout` is the attempt
    /// timeout that was in force for the failed request.
    pub fn into_common(self, timeout: Duration) -> CommonError {
        if self.is_timeout() {
            CommonError::Timeout(timeout)
        } else {
            CommonError::ServiceUnavailable(self.to_string())
        }
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let http = reqwest::Client::builder()
            .user_agent("exam-support/fallback")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiClientConfig {
        &self.config
    }

    pub async fn chat_completions(
        &self,
        request: ChatCompletionRequest,
        timeout_override: Option<Duration>,
    ) -> Result<ChatCompletionResponse, OpenAiClientError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let timeout = timeout_override.unwrap_or(self.config.default_timeout);
        self.request_with_retry(|| {
            let req = request.clone();
            let url = url.clone();
            async move {
                let mut builder = self.http.post(&url).timeout(timeout).json(&req);
                if let Some(key) = &self.config.api_key {
                    builder = builder.bearer_auth(key);
                }
                let resp = builder.send().await?;
                Self::parse_json_response(resp, self.config.max_error_body_bytes).await
            }
        })
        .await
    }

    async fn parse_json_response<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> Result<T, OpenAiClientError> {
        if resp.status().is_success() {
            let body = resp.bytes().await?;
            return Ok(serde_json::from_slice::<T>(&body)?);
        }
        Err(Self::to_upstream_error(resp, max_error_body_bytes).await)
    }

    async fn to_upstream_error(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> OpenAiClientError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<OpenAiErrorEnvelope>(&body) {
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| "unknown upstream error".to_string());
            return OpenAiClientError::Upstream { status, message };
        }
        OpenAiClientError::UpstreamBody { status, body }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, OpenAiClientError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, OpenAiClientError>>,
    {
        let max_retries = self.config.max_retries.min(MAX_RETRIES_CAP);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > max_retries || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "chat completion request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn should_retry(err: &OpenAiClientError) -> bool {
    match err {
        OpenAiClientError::Request(e) => {
            e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
        }
        OpenAiClientError::Upstream { status, .. }
        | OpenAiClientError::UpstreamBody { status, .. } => is_retryable_status(*status),
        OpenAiClientError::InvalidJson(_) => false,
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    let jitter_ms = pseudo_jitter_ms(jitter_cap);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = now.subsec_nanos() as u64;
    nanos % (max_inclusive + 1)
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read upstream error body");
            "<failed to read error body>".to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorObject,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorObject {
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
}

impl ChatCompletionResponse {
    /// Trimmed content of the first choice, or `None` when the upstream returned nothing
    /// usable.
    pub fn first_text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn client_with_retries(max_retries: u32) -> OpenAiClient {
        OpenAiClient::new(OpenAiClientConfig {
            base_url: "http://upstream.invalid/v1".to_string(),
            api_key: None,
            default_timeout: Duration::from_millis(100),
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_error_body_bytes: 1024,
        })
        .expect("client builds")
    }

    async fn attempts_for(client: &OpenAiClient, status: StatusCode) -> u32 {
        let calls = AtomicU32::new(0);
        let result: Result<(), OpenAiClientError> = client
            .request_with_retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(OpenAiClientError::Upstream {
                        status,
                        message: "failing".to_string(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        calls.load(Ordering::SeqCst)
    }

    fn config_from(pairs: &[(&str, &str)]) -> OpenAiClientConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OpenAiClientConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.api_key, None);
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn retries_are_clamped_to_one() {
        let config = config_from(&[("OPENAI_MAX_RETRIES", "5")]);
        assert_eq!(config.max_retries, MAX_RETRIES_CAP);

        let config = config_from(&[("OPENAI_MAX_RETRIES", "0")]);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn base_url_trailing_slash_and_blank_key() {
        let config = config_from(&[
            ("OPENAI_BASE_URL", "http://localhost:8001/v1/"),
            ("OPENAI_API_KEY", "   "),
            ("OPENAI_TIMEOUT_SECS", "not-a-number"),
        ]);
        assert_eq!(config.base_url, "http://localhost:8001/v1");
        assert_eq!(config.api_key, None);
        assert_eq!(config.default_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retryable_failure_is_tried_at_most_twice() {
        let client = client_with_retries(1);
        assert_eq!(attempts_for(&client, StatusCode::SERVICE_UNAVAILABLE).await, 2);

        // The cap holds even when the config was built by hand.
        let client = client_with_retries(5);
        assert_eq!(attempts_for(&client, StatusCode::SERVICE_UNAVAILABLE).await, 2);

        let client = client_with_retries(0);
        assert_eq!(attempts_for(&client, StatusCode::SERVICE_UNAVAILABLE).await, 1);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_tried_once() {
        let client = client_with_retries(1);
        assert_eq!(attempts_for(&client, StatusCode::UNAUTHORIZED).await, 1);
    }

    #[test]
    fn upstream_status_retry_policy() {
        let err = |status| OpenAiClientError::Upstream {
            status,
            message: "x".to_string(),
        };
        assert!(should_retry(&err(StatusCode::TOO_MANY_REQUESTS)));
        assert!(should_retry(&err(StatusCode::BAD_GATEWAY)));
        assert!(!should_retry(&err(StatusCode::UNAUTHORIZED)));
        assert!(!should_retry(&err(StatusCode::BAD_REQUEST)));
    }

    #[test]
    fn upstream_errors_map_to_service_unavailable() {
        let err = OpenAiClientError::UpstreamBody {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "down".to_string(),
        };
        let common = err.into_common(Duration::from_secs(10));
        assert!(matches!(common, CommonError::ServiceUnavailable(_)));
    }

    #[test]
    fn backoff_is_capped_with_bounded_jitter() {
        let initial = Duration::from_millis(200);
        let max = Duration::from_millis(1_000);
        for exponent in 0..10 {
            let delay = backoff_delay(initial, max, exponent);
            assert!(delay >= initial.min(max));
            assert!(delay <= max + max / 4);
        }
    }

    #[test]
    fn first_text_trims_and_skips_empty() {
        let body = r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":"  Refresh the page.\n"},"finish_reason":"stop"}],"usage":null}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(body).expect("valid json");
        assert_eq!(resp.first_text().as_deref(), Some("Refresh the page."));

        let empty = r#"{"choices":[{"message":{"content":"   "}}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(empty).expect("valid json");
        assert_eq!(resp.first_text(), None);

        let none = r#"{"choices":[]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(none).expect("valid json");
        assert_eq!(resp.first_text(), None);
    }

    #[test]
    fn request_omits_unset_options() {
        let req = ChatCompletionRequest {
            model: "gpt-4".to_string(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            temperature: None,
            max_tokens: Some(150),
        };
        let json = serde_json::to_value(&req).expect("serializes");
        assert!(json.get("temperature").is_none());
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
