// src/provider/backend.rs — Capability-typed backend handle
//
// A backend is one model on one provider, fixed at configuration time to
// either schema-constrained decoding or raw JSON mode.

use std::sync::Arc;
use std::time::Duration;

use super::{ChatRequest, ModelProvider, ModelRef, TokenUsage};
use crate::core::schema::ResponseSchema;
use crate::core::token_budget::usage_or_estimate;
use crate::infra::errors::ReasonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The provider enforces a JSON schema on the reply.
    Structured,
    /// Free text; the caller extracts and validates JSON itself.
    Raw,
}

/// Provider default: only OpenAI's own endpoint honours strict schemas.
pub fn default_capability(provider_id: &str) -> Capability {
    match provider_id {
        "openai" => Capability::Structured,
        _ => Capability::Raw,
    }
}

/// Text of one reply plus the tokens it cost.
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    pub usage: TokenUsage,
}

#[derive(Clone)]
pub struct Backend {
    model: ModelRef,
    label: String,
    provider: Arc<dyn ModelProvider>,
    capability: Capability,
    max_tokens: u32,
    temperature: f32,
    request_timeout: Duration,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("model", &self.label)
            .field("capability", &self.capability)
            .finish()
    }
}

impl Backend {
    pub fn new(model: ModelRef, provider: Arc<dyn ModelProvider>, capability: Capability) -> Self {
        Self {
            label: model.to_string(),
            model,
            provider,
            capability,
            max_tokens: 4096,
            temperature: 1.0,
            request_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32, request_timeout: Duration) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self.request_timeout = request_timeout;
        self
    }

    /// "provider/model"
    pub fn id(&self) -> &str {
        &self.label
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// One schema-constrained request.
    pub async fn call_structured(
        &self,
        prompt: &str,
        schema: &ResponseSchema,
    ) -> Result<Reply, ReasonError> {
        let mut request = self.request(prompt);
        request.response_format = Some(schema.response_format());
        self.send(prompt, request).await
    }

    /// One JSON-mode request; the prompt must carry its own format hint.
    pub async fn call_raw(&self, prompt: &str) -> Result<Reply, ReasonError> {
        let mut request = self.request(prompt);
        request.json_mode = true;
        self.send(prompt, request).await
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.model.clone(),
            prompt: prompt.to_string(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            ..Default::default()
        }
    }

    async fn send(&self, prompt: &str, request: ChatRequest) -> Result<Reply, ReasonError> {
        let response = tokio::time::timeout(self.request_timeout, self.provider.chat(request))
            .await
            .map_err(|_| ReasonError::Timeout {
                backend: self.label.clone(),
                after_ms: self.request_timeout.as_millis() as u64,
            })??;

        tracing::debug!(
            backend = %self.label,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Backend replied"
        );

        let usage = usage_or_estimate(response.usage, prompt, &response.content);
        Ok(Reply {
            content: response.content,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, StopReason};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the last request and replies after an optional delay.
    struct EchoProvider {
        delay: Duration,
        usage: TokenUsage,
        last: Mutex<Option<ChatRequest>>,
    }

    impl EchoProvider {
        fn new(delay_ms: u64, usage: TokenUsage) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                usage,
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ModelProvider for EchoProvider {
        fn id(&self) -> &str {
            "echo"
        }
        fn name(&self) -> &str {
            "Echo"
        }
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ReasonError> {
            *self.last.lock().unwrap() = Some(request);
            tokio::time::sleep(self.delay).await;
            Ok(ChatResponse {
                content: "{\"answer\": \"4\"}".into(),
                usage: self.usage,
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    #[test]
    fn test_default_capability() {
        assert_eq!(default_capability("openai"), Capability::Structured);
        assert_eq!(default_capability("groq"), Capability::Raw);
        assert_eq!(default_capability("anthropic"), Capability::Raw);
    }

    #[tokio::test]
    async fn test_structured_call_sets_schema() {
        let provider = Arc::new(EchoProvider::new(0, TokenUsage::default()));
        let backend = Backend::new(
            ModelRef::new("echo", "m1"),
            provider.clone(),
            Capability::Structured,
        )
        .with_limits(512, 0.5, Duration::from_secs(5));
        backend
            .call_structured("What is 2+2?", &ResponseSchema::Answer)
            .await
            .unwrap();

        let req = provider.last.lock().unwrap().clone().unwrap();
        assert_eq!(req.model, "m1");
        assert_eq!(req.prompt, "What is 2+2?");
        assert_eq!(req.max_tokens, Some(512));
        assert_eq!(req.temperature, Some(0.5));
        assert_eq!(req.response_format.unwrap().name, "answer");
        assert!(!req.json_mode);
    }

    #[tokio::test]
    async fn test_raw_call_uses_json_mode_and_estimates_usage() {
        let provider = Arc::new(EchoProvider::new(0, TokenUsage::default()));
        let backend = Backend::new(ModelRef::new("echo", "m1"), provider.clone(), Capability::Raw);
        let reply = backend.call_raw("abcdefgh").await.unwrap();

        let req = provider.last.lock().unwrap().clone().unwrap();
        assert!(req.json_mode);
        assert!(req.response_format.is_none());
        assert_eq!(reply.usage.input_tokens, 2);
        assert_eq!(reply.usage.output_tokens, 4);
    }

    #[tokio::test]
    async fn test_reported_usage_wins() {
        let reported = TokenUsage {
            input_tokens: 100,
            output_tokens: 7,
        };
        let backend = Backend::new(
            ModelRef::new("echo", "m1"),
            Arc::new(EchoProvider::new(0, reported)),
            Capability::Raw,
        );
        assert_eq!(backend.call_raw("x").await.unwrap().usage, reported);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let backend = Backend::new(
            ModelRef::new("echo", "slow"),
            Arc::new(EchoProvider::new(200, TokenUsage::default())),
            Capability::Raw,
        )
        .with_limits(64, 1.0, Duration::from_millis(10));
        let err = backend.call_raw("x").await.unwrap_err();
        assert!(matches!(err, ReasonError::Timeout { after_ms: 10, .. }));
        assert_eq!(backend.id(), "echo/slow");
    }
}
