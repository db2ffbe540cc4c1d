//! OpenAI-compatible chat-completions client
//!
//! Works against any endpoint speaking the OpenAI chat-completions protocol,
//! including Gemini's OpenAI-compatible surface. Failures are classified
//! from the HTTP status and error body, never from message substrings.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ModelSettings;
use crate::error::{Error, Result};
use crate::types::TokenUsage;

use super::{ApiCredential, CallError, Completion, CompletionRequest, ModelClient};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API base URL; `/chat/completions` is appended
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// HTTP-level timeout in seconds
    pub timeout_secs: u64,
}

impl From<&ModelSettings> for OpenAiConfig {
    fn from(settings: &ModelSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: Some(settings.temperature),
            timeout_secs: settings.timeout_secs,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// OpenAI API types (request/response)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────

/// HTTP model client for OpenAI-compatible APIs
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    total_requests: RwLock<u64>,
    total_tokens: RwLock<u64>,
}

impl OpenAiClient {
    /// Create a new client with the given configuration
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            model = %config.model,
            "OpenAI-compatible client created"
        );

        Ok(Self {
            config,
            client,
            total_requests: RwLock::new(0),
            total_tokens: RwLock::new(0),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// Successful requests and tokens consumed so far
    pub fn totals(&self) -> (u64, u64) {
        (*self.total_requests.read(), *self.total_tokens.read())
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, CallError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: self.config.temperature,
        };

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(auth) = credential.bearer() {
            req = req.header("Authorization", auth);
        }

        let response = req.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let err = classify_error_response(status, &headers, &body);
            warn!(status = %status, class = err.class(), "Model API returned an error");
            debug!(body = %truncate(&body, 500), "Error response body");
            return Err(err);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transient(format!("failed to decode response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::Transient("no choices in API response".to_string()))?;

        *self.total_requests.write() += 1;
        let usage = parsed.usage.map(|u| {
            *self.total_tokens.write() += u64::from(u.prompt_tokens + u.completion_tokens);
            TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }
        });

        let (requests, tokens) = self.totals();
        debug!(requests, tokens, "Cumulative model usage");

        Ok(Completion { text, usage })
    }
}

// ─────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────

fn classify_transport_error(e: reqwest::Error) -> CallError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        CallError::Transient(format!("request failed: {}", e))
    } else {
        CallError::Fatal(format!("request error: {}", e))
    }
}

/// Map a non-success HTTP response onto the call taxonomy.
pub(crate) fn classify_error_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> CallError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => CallError::RateLimited {
            retry_after: retry_after_header(headers).or_else(|| parse_retry_delay(body)),
        },
        StatusCode::REQUEST_TIMEOUT => {
            CallError::Transient(format!("API error {}: {}", status, truncate(body, 200)))
        }
        s if s.is_server_error() => {
            CallError::Transient(format!("API error {}: {}", status, truncate(body, 200)))
        }
        _ => CallError::Fatal(format!("API error {}: {}", status, truncate(body, 200))),
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Extract the server-suggested retry delay from an error body.
///
/// Understands `"retryDelay": "17s"` (google.rpc.RetryInfo, anywhere in the
/// JSON tree), `"retry_delay": {"seconds": 17}`, and the protobuf text form
/// `retry_delay { seconds: 17 }` when the body is not JSON.
pub(crate) fn parse_retry_delay(body: &str) -> Option<Duration> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(d) = find_retry_delay(&value) {
            return Some(d);
        }
    }

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r#"retryDelay['"]?\s*[:=]\s*['"](\d+(?:\.\d+)?)s['"]"#,
            r"retry_delay\s*\{\s*seconds:\s*(\d+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    });
    patterns.iter().find_map(|re| {
        re.captures(body)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_seconds(m.as_str()))
    })
}

fn find_retry_delay(value: &Value) -> Option<Duration> {
    match value {
        Value::Object(map) => {
            if let Some(d) = map.get("retryDelay").and_then(Value::as_str) {
                if let Some(parsed) = parse_seconds(d.trim_end_matches('s')) {
                    return Some(parsed);
                }
            }
            if let Some(d) = map.get("retry_delay") {
                let secs = d.get("seconds").unwrap_or(d);
                let parsed = secs
                    .as_f64()
                    .or_else(|| secs.as_str().and_then(|s| s.parse().ok()))
                    .and_then(seconds);
                if parsed.is_some() {
                    return parsed;
                }
            }
            map.values().find_map(find_retry_delay)
        }
        Value::Array(items) => items.iter().find_map(find_retry_delay),
        _ => None,
    }
}

fn parse_seconds(s: &str) -> Option<Duration> {
    s.parse::<f64>().ok().and_then(seconds)
}

/// `None` for negative, non-finite or unrepresentable values.
fn seconds(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
