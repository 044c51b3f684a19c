// src/provider/mod.rs — Model provider layer

pub mod anthropic;
pub mod backend;
pub mod openai;
pub mod openai_compat;
pub mod resolver;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::ReasonError;

/// Core trait that all model providers implement.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ReasonError>;
}

/// One single-turn request. Every prompt the engine builds is
/// self-contained, so the provider sends it as the only user message.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Schema the provider must constrain decoding to.
    pub response_format: Option<ResponseFormat>,
    /// Ask for a bare JSON object without a schema guarantee.
    pub json_mode: bool,
}

/// A named JSON schema for schema-constrained decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    #[default]
    Unknown,
}

/// Reference to a specific model on a specific provider.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parse "provider/model" format. The model part may itself contain slashes.
    pub fn parse(s: &str) -> Option<Self> {
        let (provider, model) = s.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Map a reqwest transport failure onto the provider error shape.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> ReasonError {
    ReasonError::Provider {
        provider: provider.to_string(),
        message: e.to_string(),
        retriable: e.is_timeout() || e.is_connect(),
    }
}

/// Map a non-success HTTP status onto the provider error shape.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> ReasonError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(5000);
        return ReasonError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms,
        };
    }
    let body = response.text().await.unwrap_or_default();
    ReasonError::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {}: {}", status, body),
        retriable: status.is_server_error(),
    }
}
