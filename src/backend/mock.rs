//! Mock model client
//!
//! Replays a scripted sequence of replies, then falls back to a canned
//! offline responder. Used by unit tests and by `provider = "mock"` for dry
//! runs that never touch the network.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;

use crate::types::TokenUsage;

use super::{ApiCredential, CallError, Completion, CompletionRequest, ModelClient};

// ─────────────────────────────────────────────────────────────────
// Mock Configuration
// ─────────────────────────────────────────────────────────────────

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with this text
    Text(String),
    /// Fail with this classified error
    Fail(CallError),
    /// Never answer; exercises the caller's timeout
    Hang,
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        MockReply::Fail(CallError::RateLimited {
            retry_after: retry_after_secs.map(Duration::from_secs),
        })
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        MockReply::Fail(CallError::Transient(msg.into()))
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        MockReply::Fail(CallError::Fatal(msg.into()))
    }
}

/// Configuration for mock client behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Simulated latency per call
    pub latency_ms: u64,

    /// Fixed response once the script is exhausted (None = canned responder)
    pub fixed_response: Option<String>,
}

// ─────────────────────────────────────────────────────────────────
// Mock Client
// ─────────────────────────────────────────────────────────────────

/// Mock implementation of ModelClient for testing
pub struct MockClient {
    config: MockConfig,
    script: Mutex<VecDeque<MockReply>>,
    prompts: RwLock<Vec<String>>,
}

impl MockClient {
    /// Create a mock that only uses the canned responder
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            script: Mutex::new(VecDeque::new()),
            prompts: RwLock::new(Vec::new()),
        }
    }

    /// Create a mock that replays `replies` in order
    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let mock = Self::new();
        mock.push_replies(replies);
        mock
    }

    pub fn push_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        self.script.lock().extend(replies);
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.prompts.read().len()
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().clone()
    }

    /// Scripted replies not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn canned_response(&self, prompt: &str) -> String {
        if let Some(ref fixed) = self.config.fixed_response {
            return fixed.clone();
        }

        if prompt.contains("=== Marketing copy ===") {
            let score = 5 + (prompt.chars().count() % 5);
            let body = json!({
                "score": score,
                "reasons_to_buy": ["Addresses my learning goals"],
                "reasons_not_to_buy": ["Price is not mentioned"]
            });
            return format!("Here is my feedback.\n```json\n{:#}\n```", body);
        }

        let body = json!([
            {
                "persona_id": "1",
                "description": "Working professional upskilling in the evenings",
                "motivation": "Career advancement",
                "challenges": "Limited time after work",
                "learning_goals": "Apply new skills on the job within three months",
                "preferred_learning_methods": "Short videos with hands-on exercises",
                "suggested_learning_resources": [{
                    "feature_name": "Micro-lessons",
                    "description": "Ten-minute lessons",
                    "justification": "Fits a busy schedule"
                }]
            },
            {
                "persona_id": "2",
                "description": "University student exploring a new field",
                "motivation": "Curiosity and internships",
                "challenges": "Lacks practical experience",
                "learning_goals": "Build a portfolio project",
                "preferred_learning_methods": "Project-based learning with peers",
                "suggested_learning_resources": [{
                    "feature_name": "Capstone project",
                    "description": "Guided end-to-end project",
                    "justification": "Produces portfolio evidence"
                }]
            }
        ]);
        format!("```json\n{:#}\n```", body)
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(
        &self,
        _credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> Result<Completion, CallError> {
        self.prompts.write().push(request.prompt.clone());

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        let reply = self.script.lock().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(usage_for(&request.prompt, text)),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang) => {
                std::future::pending::<()>().await;
                Err(CallError::Transient("mock hang ended".to_string()))
            }
            None => Ok(usage_for(&request.prompt, self.canned_response(&request.prompt))),
        }
    }
}

fn usage_for(prompt: &str, text: String) -> Completion {
    let usage = TokenUsage {
        prompt_tokens: (prompt.chars().count() / 2) as u32,
        completion_tokens: (text.chars().count() / 2) as u32,
    };
    Completion {
        text,
        usage: Some(usage),
    }
}
