// src/provider/retry.rs — Transport retry with exponential backoff
//
// Retries rate limits (429), server errors (5xx), timeouts and connection
// resets. Bad requests and auth errors go straight through. This layer only
// handles transport; schema validation retries live in the fan-out generator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider};
use crate::infra::config::RetryPolicyConfig;
use crate::infra::errors::ReasonError;

const BACKOFF_FACTOR: f64 = 2.0;
const JITTER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::from(&RetryPolicyConfig::default())
    }
}

impl From<&RetryPolicyConfig> for RetryConfig {
    fn from(cfg: &RetryPolicyConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

/// A provider wrapper that adds retry with exponential backoff to `chat()`.
pub struct RetryProvider {
    inner: Arc<dyn ModelProvider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn ModelProvider>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn ModelProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Delay before retry `attempt` (0-indexed).
    fn delay_for_attempt(&self, attempt: u32, rate_limit_delay: Option<Duration>) -> Duration {
        if let Some(rl_delay) = rate_limit_delay {
            return rl_delay + Duration::from_millis(100);
        }

        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let jitter = deterministic_jitter(attempt, self.config.jitter_fraction);
        let final_ms = (capped_ms * jitter).max(1.0);

        Duration::from_millis(final_ms as u64)
    }
}

fn should_retry(error: &ReasonError) -> bool {
    error.is_retriable()
}

fn rate_limit_delay(error: &ReasonError) -> Option<Duration> {
    match error {
        ReasonError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Multiplier in [1 - fraction, 1 + fraction], reproducible per attempt.
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl ModelProvider for RetryProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ReasonError> {
        let mut attempt = 0;
        loop {
            match self.inner.chat(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !should_retry(&e) || attempt >= self.config.max_retries {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt, rate_limit_delay(&e));

                    tracing::warn!(
                        provider = self.inner.id(),
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{StopReason, TokenUsage};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times with the given error kind, then succeeds.
    struct FlakyProvider {
        failures: u32,
        retriable: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ModelProvider for FlakyProvider {
        fn id(&self) -> &str {
            "flaky"
        }
        fn name(&self) -> &str {
            "Flaky"
        }
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ReasonError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ReasonError::Provider {
                    provider: "flaky".into(),
                    message: "HTTP 503".into(),
                    retriable: self.retriable,
                });
            }
            Ok(ChatResponse {
                content: "ok".into(),
                usage: TokenUsage::default(),
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(4),
            jitter_fraction: 0.0,
        }
    }

    #[test]
    fn test_should_retry_rate_limited() {
        let err = ReasonError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 5000,
        };
        assert!(should_retry(&err));
        assert_eq!(rate_limit_delay(&err), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_should_not_retry_timeout() {
        let err = ReasonError::Timeout {
            backend: "test".into(),
            after_ms: 10,
        };
        assert!(!should_retry(&err));
    }

    #[test]
    fn test_rate_limit_delay_zero() {
        let err = ReasonError::RateLimited {
            provider: "test".into(),
            retry_after_ms: 0,
        };
        assert!(rate_limit_delay(&err).is_none());
    }

    #[test]
    fn test_delay_for_attempt_exponential() {
        let provider = RetryProvider::new(Arc::new(FlakyProvider {
            failures: 0,
            retriable: true,
            calls: AtomicU32::new(0),
        }));
        let d0 = provider.delay_for_attempt(0, None);
        let d1 = provider.delay_for_attempt(1, None);
        assert!(d0.as_millis() >= 1500 && d0.as_millis() <= 2500);
        assert!(d1.as_millis() >= 3000 && d1.as_millis() <= 5000);
        let capped = provider.delay_for_attempt(12, None);
        assert!(capped.as_millis() <= 36_000);
    }

    #[test]
    fn test_deterministic_jitter_range() {
        for attempt in 0..20 {
            let j = deterministic_jitter(attempt, 0.2);
            assert!((0.8..=1.2).contains(&j), "jitter {} out of range", j);
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let inner = Arc::new(FlakyProvider {
            failures: 2,
            retriable: true,
            calls: AtomicU32::new(0),
        });
        let p = RetryProvider::with_config(inner.clone(), fast_config(3));
        let resp = p.chat(ChatRequest::default()).await.unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let inner = Arc::new(FlakyProvider {
            failures: 10,
            retriable: true,
            calls: AtomicU32::new(0),
        });
        let p = RetryProvider::with_config(inner.clone(), fast_config(2));
        assert!(p.chat(ChatRequest::default()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_fails_fast() {
        let inner = Arc::new(FlakyProvider {
            failures: 1,
            retriable: false,
            calls: AtomicU32::new(0),
        });
        let p = RetryProvider::with_config(inner.clone(), fast_config(5));
        assert!(p.chat(ChatRequest::default()).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
