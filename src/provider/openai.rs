// src/provider/openai.rs — OpenAI Chat Completions provider
//
// The only built-in provider that honours `response_format.json_schema`
// with strict decoding, so it backs the structured capability.

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider, StopReason, TokenUsage};
use crate::infra::errors::ReasonError;

pub struct OpenAIProvider {
    id_str: String,
    api_key: Option<String>,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url("openai", Some(api_key), "https://api.openai.com/v1".into())
    }

    /// Any endpoint that speaks the chat completions wire format.
    pub fn with_base_url(id: impl Into<String>, api_key: Option<String>, base_url: String) -> Self {
        Self {
            id_str: id.into(),
            api_key,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Build the chat completions request body.
pub(crate) fn build_body(request: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": [{"role": "user", "content": request.prompt}],
    });

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    if let Some(format) = &request.response_format {
        body["response_format"] = serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": format.name,
                "schema": format.schema,
                "strict": true,
            }
        });
    } else if request.json_mode {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }
    body
}

/// Pull content, usage and stop reason out of a chat completions response.
pub(crate) fn parse_response(provider: &str, resp: &serde_json::Value) -> Result<ChatResponse, ReasonError> {
    let choice = &resp["choices"][0];
    if choice.is_null() {
        return Err(ReasonError::Provider {
            provider: provider.to_string(),
            message: "Response contained no choices".into(),
            retriable: false,
        });
    }

    if let Some(refusal) = choice["message"]["refusal"].as_str() {
        return Err(ReasonError::Provider {
            provider: provider.to_string(),
            message: format!("Model refused: {}", refusal),
            retriable: false,
        });
    }

    let content = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    let stop_reason = match choice["finish_reason"].as_str() {
        Some("stop") => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Unknown,
    };

    Ok(ChatResponse {
        content,
        usage,
        stop_reason,
    })
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ReasonError> {
        let body = build_body(&request);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
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
