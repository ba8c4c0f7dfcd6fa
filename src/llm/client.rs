//! Generation client: provider calls with timeout, retry, backoff and a
//! bounded number of calls in flight.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{Config, RetryConfig};
use crate::errors::GenerationError;
use crate::llm::provider::{CompletionRequest, LlmProvider, ProviderError};
use crate::types::PromptPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based),
    /// without jitter: base × 2^(attempt-1), raised to the provider's
    /// Retry-After hint, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let exponential = self.base_delay.saturating_mul(factor);
        exponential.max(hint.unwrap_or_default()).min(self.max_delay)
    }

    fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.backoff(attempt, hint) + jitter
    }
}

/// Text returned by the provider and how many calls it took.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub provider_calls: u32,
}

/// Sends prompt payloads to an [`LlmProvider`]. Knows nothing about content
/// types; everything it needs is in the payload and the configuration.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    top_p: f32,
    timeout: Duration,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl GenerationClient {
    pub fn new(config: &Config, provider: Arc<dyn LlmProvider>) -> Self {
        let llm = &config.llm;
        Self {
            provider,
            model: llm.model.clone(),
            temperature: llm.temperature,
            top_p: llm.top_p,
            timeout: llm.request_timeout(),
            retry: RetryPolicy::from(&config.retry),
            permits: Arc::new(Semaphore::new(llm.max_concurrent_requests.max(1))),
        }
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Model a call for `payload` goes to: its override, else the configured one.
    pub fn model_for<'a>(&'a self, payload: &'a PromptPayload) -> &'a str {
        payload.model.as_deref().unwrap_or(&self.model)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Calls currently allowed to start without queueing.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn generate(&self, payload: &PromptPayload) -> Result<GenerationOutput, GenerationError> {
        let request = CompletionRequest {
            system: payload.system_instruction.clone(),
            user: payload.user_instruction.clone(),
            model: self.model_for(payload).to_string(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: payload.constraints.max_output_tokens,
        };

        let mut last_error = ProviderError::Timeout;
        for attempt in 1..=self.retry.max_attempts {
            let outcome = self.call_once(&request).await?;
            match outcome {
                Ok(text) => {
                    debug!(attempt, chars = text.len(), "provider call succeeded");
                    return Ok(GenerationOutput {
                        text,
                        provider_calls: attempt,
                    });
                }
                Err(e) if !e.is_transient() => {
                    warn!(attempt, error = %e, "provider rejected request");
                    return Err(GenerationError::ProviderRejected {
                        status: e.status(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(attempt, max_attempts = self.retry.max_attempts, error = %e, "provider call failed");
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.delay(attempt, e.retry_after());
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying provider call");
                        tokio::time::sleep(delay).await;
                    }
                    last_error = e;
                }
            }
        }

        Err(GenerationError::ProviderUnavailable {
            attempts: self.retry.max_attempts,
            last_error: last_error.to_string(),
        })
    }

    /// One attempt under the concurrency limit and the per-attempt timeout.
    /// The permit is held for the call only, not during backoff.
    async fn call_once(
        &self,
        request: &CompletionRequest,
    ) -> Result<Result<String, ProviderError>, GenerationError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GenerationError::ProviderUnavailable {
                attempts: 0,
                last_error: e.to_string(),
            })?;

        Ok(tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .unwrap_or(Err(ProviderError::Timeout)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::types::{LengthBounds, LengthUnit, PromptConstraints};

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::Timeout))
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config.retry.jitter_ms = 0;
        config
    }

    fn payload() -> PromptPayload {
        PromptPayload {
            system_instruction: "system".into(),
            user_instruction: "user".into(),
            constraints: PromptConstraints {
                max_output_tokens: 100,
                length: LengthBounds {
                    min: 1,
                    max: 10,
                    unit: LengthUnit::Words,
                },
                length_tolerance: 0.15,
                hard_char_ceiling: None,
                required_markers: vec![],
            },
            model: None,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.backoff(1, None), Duration::from_millis(500));
        assert_eq!(policy.backoff(2, None), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3, None), Duration::from_millis(2000));
        assert_eq!(policy.backoff(4, None), Duration::from_millis(3000));
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(2))),
            Duration::from_millis(2000)
        );
        assert_eq!(
            policy.backoff(1, Some(Duration::from_secs(60))),
            Duration::from_millis(3000)
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Scripted::new(vec![
            Err(ProviderError::Server {
                status: 502,
                body: "bad gateway".into(),
            }),
            Err(ProviderError::RateLimited { retry_after: None }),
            Ok("done".into()),
        ]);
        let client = GenerationClient::new(&fast_config(), provider.clone());
        let output = client.generate(&payload()).await.unwrap();
        assert_eq!(output.text, "done");
        assert_eq!(output.provider_calls, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let provider = Scripted::new(vec![Err(ProviderError::Rejected {
            status: 401,
            body: "invalid api key".into(),
        })]);
        let client = GenerationClient::new(&fast_config(), provider.clone());
        let err = client.generate(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::ProviderRejected {
                status: Some(401),
                ..
            }
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let provider = Scripted::new(vec![]);
        let client = GenerationClient::new(&fast_config(), provider.clone());
        let err = client.generate(&payload()).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::ProviderUnavailable { attempts: 3, .. }
        ));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
            Ok(request.model.clone())
        }
    }

    #[tokio::test]
    async fn test_payload_model_overrides_configured_model() {
        let client = GenerationClient::new(&fast_config(), Arc::new(Echo));
        let output = client.generate(&payload()).await.unwrap();
        assert_eq!(output.text, "gpt-4o");

        let pinned = PromptPayload {
            model: Some("ft:gpt-4o:pablo".into()),
            ..payload()
        };
        assert_eq!(client.model_for(&pinned), "ft:gpt-4o:pablo");
        let output = client.generate(&pinned).await.unwrap();
        assert_eq!(output.text, "ft:gpt-4o:pablo");
    }

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".into())
        }
    }

    #[tokio::test]
    async fn test_per_attempt_timeout() {
        let mut config = fast_config();
        config.retry.max_attempts = 2;
        let client = GenerationClient::new(&config, Arc::new(Slow)).with_timeout(Duration::from_millis(20));
        let err = client.generate(&payload()).await.unwrap_err();
        assert_eq!(err.code(), "provider_unavailable");
        assert!(err.to_string().contains("timed out"));
        assert_eq!(client.available_permits(), 4);
    }
}
