// src/provider/openai_compat.rs — Generic OpenAI-compatible provider
//
// Used by: Groq, Gemini, Cohere, Mistral, DeepSeek, Ollama and custom endpoints.
// These endpoints do not reliably honour strict json_schema decoding, so a
// schema in the request is downgraded to plain JSON mode.

use async_trait::async_trait;

use super::openai::{build_body, parse_response};
use super::{ChatRequest, ChatResponse, ModelProvider};
use crate::infra::errors::ReasonError;

/// A well-known OpenAI-compatible endpoint.
pub struct KnownEndpoint {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    /// `None` for local servers that take no key.
    pub api_key_env: Option<&'static str>,
}

pub const KNOWN_ENDPOINTS: &[KnownEndpoint] = &[
    KnownEndpoint {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        api_key_env: Some("GROQ_API_KEY"),
    },
    KnownEndpoint {
        id: "gemini",
        name: "Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        api_key_env: Some("GEMINI_API_KEY"),
    },
    KnownEndpoint {
        id: "cohere",
        name: "Cohere",
        base_url: "https://api.cohere.ai/compatibility/v1",
        api_key_env: Some("COHERE_API_KEY"),
    },
    KnownEndpoint {
        id: "mistral",
        name: "Mistral",
        base_url: "https://api.mistral.ai/v1",
        api_key_env: Some("MISTRAL_API_KEY"),
    },
    KnownEndpoint {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com/v1",
        api_key_env: Some("DEEPSEEK_API_KEY"),
    },
    KnownEndpoint {
        id: "ollama",
        name: "Ollama",
        base_url: "http://localhost:11434/v1",
        api_key_env: None,
    },
];

pub fn known_endpoint(id: &str) -> Option<&'static KnownEndpoint> {
    KNOWN_ENDPOINTS.iter().find(|e| e.id == id)
}

/// Provider for any OpenAI-compatible API endpoint.
pub struct OpenAICompatProvider {
    id_str: String,
    name_str: String,
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            id_str: id.into(),
            name_str: name.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_known(endpoint: &KnownEndpoint, api_key: Option<String>) -> Self {
        Self::new(endpoint.id, endpoint.name, api_key, endpoint.base_url)
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    fn name(&self) -> &str {
        &self.name_str
    }

    async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse, ReasonError> {
        if request.response_format.take().is_some() {
            tracing::debug!(
                provider = %self.id_str,
                "Schema decoding unsupported, falling back to JSON mode"
            );
            request.json_mode = true;
        }
        let body = build_body(&request);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "User-Agent",
                format!("thinkchain/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| super::transport_error(&self.id_str, e))?;

        if !response.status().is_success() {
            return Err(super::status_error(&self.id_str, response).await);
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| ReasonError::Provider {
            provider: self.id_str.clone(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;

        parse_response(&self.id_str, &resp)
    }
}
