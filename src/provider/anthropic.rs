// src/provider/anthropic.rs — Anthropic Messages API provider
//
// No schema-constrained decoding here: backends on this provider run with
// the raw capability and go through parse-and-retry.

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider, StopReason, TokenUsage};
use crate::infra::errors::ReasonError;

pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> &str {
        "https://api.anthropic.com/v1/messages"
    }

    fn build_request_body(&self, request: &ChatRequest) -> serde_json::Value {
        // max_tokens is mandatory on this API.
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "max_tokens": request.max_tokens.unwrap_or(4096),
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        body
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn name(&self) -> &str {
        "Anthropic"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ReasonError> {
        let body = self.build_request_body(&request);

        let response = self
            .client
            .post(self.api_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| super::transport_error("anthropic", e))?;

        if !response.status().is_success() {
            return Err(super::status_error("anthropic", response).await);
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| ReasonError::Provider {
            provider: "anthropic".into(),
            message: format!("Failed to parse response: {}", e),
            retriable: false,
        })?;

        let content = resp["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|c| c["type"] == "text")
                    .map(|c| c["text"].as_str().unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = TokenUsage {
            input_tokens: resp["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: resp["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        };

        let stop_reason = match resp["stop_reason"].as_str() {
            Some("end_turn") => StopReason::EndTurn,
            Some("max_tokens") => StopReason::MaxTokens,
            Some("stop_sequence") => StopReason::StopSequence,
            _ => StopReason::Unknown,
        };

        Ok(ChatResponse {
            content,
            usage,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_single_user_message() {
        let p = AnthropicProvider::new("k".into());
        let req = ChatRequest {
            model: "claude-3-5-sonnet-20240620".into(),
            prompt: "question".into(),
            ..Default::default()
        };
        let body = p.build_request_body(&req);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "question");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_limits_passed_through() {
        let p = AnthropicProvider::new("k".into());
        let req = ChatRequest {
            model: "m".into(),
            prompt: "q".into(),
            max_tokens: Some(256),
            temperature: Some(1.0),
            ..Default::default()
        };
        let body = p.build_request_body(&req);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["temperature"], 1.0);
    }
}
