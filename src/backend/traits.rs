//! Model client trait definitions
//!
//! Defines the `ModelClient` trait every transport implements, along with
//! the typed outcome of a single model call.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::TokenUsage;

// ─────────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────────

/// API key passed explicitly to every call.
///
/// `Debug` never prints the secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Credential for endpoints that need none (local servers, the mock).
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value, if a key is set.
    pub fn bearer(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.0.trim()))
        }
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("ApiCredential(<none>)")
        } else {
            f.write_str("ApiCredential(<redacted>)")
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────

/// A single prompt sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Successful model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Classified failure of one model call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Quota or rate limit hit; `retry_after` is the API's hint when it gave one
    #[error("rate limited{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Timeout, connection failure or 5xx-like response
    #[error("transient failure: {0}")]
    Transient(String),

    /// Invalid credential or a request the API will never accept
    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl CallError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CallError::Fatal(_))
    }

    /// Short label for logs.
    pub fn class(&self) -> &'static str {
        match self {
            CallError::RateLimited { .. } => "rate_limited",
            CallError::Transient(_) => "transient",
            CallError::Fatal(_) => "fatal",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// ModelClient Trait
// ─────────────────────────────────────────────────────────────────

/// Transport that performs exactly one model invocation per call.
///
/// Implementations classify failures; retrying is left to the caller.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Issue one completion request.
    async fn complete(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<Completion, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = ApiCredential::new("AIza-secret");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("secret"));
        assert_eq!(cred.bearer().as_deref(), Some("Bearer AIza-secret"));
        assert_eq!(ApiCredential::anonymous().bearer(), None);
    }

    #[test]
    fn test_call_error_display() {
        let err = CallError::RateLimited {
            retry_after: Some(Duration::from_secs(17)),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 17s");
        assert_eq!(CallError::RateLimited { retry_after: None }.to_string(), "rate limited");
        assert!(err.is_retryable());
        assert!(!CallError::Fatal("401".into()).is_retryable());
        assert_eq!(CallError::Transient("x".into()).class(), "transient");
    }
}
