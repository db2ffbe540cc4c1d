//! Retrying wrapper around a `ModelClient`.
//!
//! Every model call in the pipelines goes through [`ResilientCaller`]. Rate
//! limits wait for the API's hint (plus a margin), transient failures back off
//! exponentially, fatal failures return immediately.

use std::sync::Arc;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tracing::{debug, info, warn};

use crate::backend::{ApiCredential, CallError, Completion, CompletionRequest, ModelClient};
use crate::config::{ModelSettings, RetrySettings};
use crate::error::{Error, Result};

/// Timing and attempt limits for one logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Deadline for a single attempt
    pub call_timeout: Duration,
    /// Added to the API's retry hint
    pub rate_limit_margin: Duration,
    /// Wait used when a rate limit carries no hint
    pub default_rate_limit_wait: Duration,
    /// Hints above this are clamped
    pub max_rate_limit_wait: Duration,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            call_timeout: Duration::from_secs(60),
            rate_limit_margin: Duration::from_secs(1),
            default_rate_limit_wait: Duration::from_secs(17),
            max_rate_limit_wait: Duration::from_secs(300),
            backoff_floor: Duration::from_secs(2),
            backoff_ceiling: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(retry: &RetrySettings, model: &ModelSettings) -> Self {
        Self {
            max_attempts: retry.max_attempts.max(1),
            call_timeout: Duration::from_secs(model.timeout_secs),
            rate_limit_margin: Duration::from_secs(retry.rate_limit_margin_secs),
            default_rate_limit_wait: Duration::from_secs(retry.default_rate_limit_wait_secs),
            max_rate_limit_wait: Duration::from_secs(retry.max_rate_limit_wait_secs),
            backoff_floor: Duration::from_secs(retry.backoff_floor_secs),
            backoff_ceiling: Duration::from_secs(retry.backoff_ceiling_secs),
        }
    }

    fn transient_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.backoff_floor,
            initial_interval: self.backoff_floor,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.backoff_ceiling,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    fn rate_limit_wait(&self, hint: Option<Duration>) -> Duration {
        match hint {
            Some(d) => d
                .min(self.max_rate_limit_wait)
                .saturating_add(self.rate_limit_margin),
            None => self.default_rate_limit_wait,
        }
    }
}

/// Bookkeeping for one logical call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Attempts made so far
    pub attempts: u32,
    /// Most recent wait before a retry
    pub last_wait: Option<Duration>,
    /// Class of the most recent failure
    pub last_error: Option<&'static str>,
}

impl RetryState {
    /// Attempts beyond the first.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Wraps a client so that each logical call survives rate limits and
/// transient failures.
#[derive(Clone)]
pub struct ResilientCaller {
    client: Arc<dyn ModelClient>,
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(client: Arc<dyn ModelClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Make one logical call.
    pub async fn call(&self, credential: &ApiCredential, prompt: &str) -> Result<Completion> {
        self.call_traced(credential, prompt).await.0
    }

    /// Make one logical call and report how many attempts it took.
    pub async fn call_traced(
        &self,
        credential: &ApiCredential,
        prompt: &str,
    ) -> (Result<Completion>, RetryState) {
        let request = CompletionRequest::new(prompt);
        let mut state = RetryState::default();
        let mut backoff = self.policy.transient_backoff();

        loop {
            state.attempts += 1;
            debug!(
                client = self.client.name(),
                attempt = state.attempts,
                prompt_chars = prompt.len(),
                "Calling model"
            );

            let err = match self.attempt(credential, &request).await {
                Ok(completion) => {
                    if state.attempts > 1 {
                        info!(attempts = state.attempts, "Model call succeeded after retry");
                    }
                    return (Ok(completion), state);
                }
                Err(err) => err,
            };
            state.last_error = Some(err.class());

            if !err.is_retryable() {
                warn!(attempt = state.attempts, error = %err, "Model call failed permanently");
                return (Err(Error::from(err)), state);
            }

            if state.attempts >= self.policy.max_attempts {
                warn!(
                    attempts = state.attempts,
                    error = %err,
                    "Model call retries exhausted"
                );
                return (
                    Err(Error::RetriesExhausted {
                        attempts: state.attempts,
                        last: Box::new(Error::from(err)),
                    }),
                    state,
                );
            }

            let wait = match err {
                CallError::RateLimited { retry_after } => self.policy.rate_limit_wait(retry_after),
                _ => backoff
                    .next_backoff()
                    .unwrap_or(self.policy.backoff_ceiling),
            };
            state.last_wait = Some(wait);

            warn!(
                attempt = state.attempts,
                max_attempts = self.policy.max_attempts,
                class = err.class(),
                wait_secs = wait.as_secs_f64(),
                error = %err,
                "Model call failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    async fn attempt(
        &self,
        credential: &ApiCredential,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, CallError> {
        match tokio::time::timeout(
            self.policy.call_timeout,
            self.client.complete(credential, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CallError::Transient(format!(
                "timed out after {}s",
                self.policy.call_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockClient, MockReply};
    use crate::error::ErrorCode;
    use tokio::time::Instant;

    fn caller(replies: Vec<MockReply>) -> (Arc<MockClient>, ResilientCaller) {
        let mock = Arc::new(MockClient::scripted(replies));
        let caller = ResilientCaller::new(mock.clone(), RetryPolicy::default());
        (mock, caller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_try() {
        let (mock, caller) = caller(vec![MockReply::text("ok")]);
        let (result, state) = caller.call_traced(&ApiCredential::anonymous(), "p").await;

        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap().text, "ok");
        assert_eq!(state.attempts, 1);
        assert_eq!(state.retries(), 0);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_backoff_doubles() {
        let (mock, caller) = caller(vec![
            MockReply::transient("502"),
            MockReply::transient("502"),
            MockReply::transient("503"),
            MockReply::transient("500"),
            MockReply::text("ok"),
        ]);
        let start = Instant::now();
        let (result, state) = caller.call_traced(&ApiCredential::anonymous(), "p").await;

        assert!(result.is_ok());
        assert_eq!(mock.call_count(), 5);
        // 2 + 4 + 8 + 16
        assert_eq!(start.elapsed().as_secs(), 30);
        assert_eq!(state.last_wait, Some(Duration::from_secs(16)));
        assert_eq!(state.last_error, Some("transient"));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        let mut backoff = policy.transient_backoff();
        let waits: Vec<u64> = (0..7)
            .map(|_| backoff.next_backoff().unwrap().as_secs())
            .collect();
        assert_eq!(waits, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_uses_hint_plus_margin() {
        let (_, caller) = caller(vec![MockReply::rate_limited(Some(17)), MockReply::text("ok")]);
        let start = Instant::now();
        let (result, state) = caller.call_traced(&ApiCredential::anonymous(), "p").await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed().as_secs(), 18);
        assert_eq!(state.last_error, Some("rate_limited"));
    }

    #[test]
    fn test_rate_limit_hint_is_clamped() {
        let policy = RetryPolicy {
            rate_limit_margin: Duration::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.rate_limit_wait(Some(Duration::MAX)), Duration::MAX);

        let policy = RetryPolicy::default();
        assert_eq!(
            policy.rate_limit_wait(Some(Duration::from_secs(u64::MAX))),
            Duration::from_secs(301)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_rate_limit_hint_waits_for_cap() {
        let (_, caller) = caller(vec![
            MockReply::rate_limited(Some(1_000_000)),
            MockReply::text("ok"),
        ]);
        let start = Instant::now();
        caller.call(&ApiCredential::anonymous(), "p").await.unwrap();
        assert_eq!(start.elapsed().as_secs(), 301);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_hint_uses_default() {
        let (_, caller) = caller(vec![MockReply::rate_limited(None), MockReply::text("ok")]);
        let start = Instant::now();
        caller.call(&ApiCredential::anonymous(), "p").await.unwrap();
        assert_eq!(start.elapsed().as_secs(), 17);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_not_retried() {
        let (mock, caller) = caller(vec![MockReply::fatal("401 Unauthorized"), MockReply::text("ok")]);
        let err = caller.call(&ApiCredential::anonymous(), "p").await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::FatalCallFailure);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let (mock, caller) = caller(vec![MockReply::transient("502"); 6]);
        let err = caller.call(&ApiCredential::anonymous(), "p").await.unwrap_err();

        match err {
            Error::RetriesExhausted { attempts, ref last } => {
                assert_eq!(attempts, 5);
                assert_eq!(last.code(), ErrorCode::TransientCallFailure);
                assert!(last.to_string().contains("502"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let (mock, caller) = caller(vec![MockReply::Hang, MockReply::text("ok")]);
        let start = Instant::now();
        let (result, state) = caller.call_traced(&ApiCredential::anonymous(), "p").await;

        assert_eq!(result.unwrap().text, "ok");
        assert_eq!(mock.call_count(), 2);
        // 60s deadline + 2s backoff
        assert_eq!(start.elapsed().as_secs(), 62);
        assert_eq!(state.last_error, Some("transient"));
    }

    #[test]
    fn test_policy_from_settings() {
        let mut retry = RetrySettings::default();
        retry.max_attempts = 0;
        let model = ModelSettings::default();
        let policy = RetryPolicy::from_settings(&retry, &model);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.call_timeout, Duration::from_secs(model.timeout_secs));
    }
}
