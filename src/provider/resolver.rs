// src/provider/resolver.rs — Provider discovery and backend resolution

use std::sync::Arc;

use super::anthropic::AnthropicProvider;
use super::backend::{default_capability, Backend, Capability};
use super::openai::OpenAIProvider;
use super::openai_compat::{OpenAICompatProvider, KNOWN_ENDPOINTS};
use super::retry::{RetryConfig, RetryProvider};
use super::{ModelProvider, ModelRef};
use crate::core::types::ReasoningSettings;
use crate::infra::config::{BackendConfig, Config};
use crate::infra::errors::ReasonError;

/// Fan-out used when neither config nor flags name any backends.
pub const DEFAULT_FANOUT: &[&str] = &[
    "openai/gpt-4o-2024-08-06",
    "anthropic/claude-3-5-sonnet-20240620",
    "gemini/gemini-1.5-pro",
    "cohere/command-r-plus-08-2024",
];

/// Discover providers from env vars and config-driven custom endpoints.
/// Every provider comes back wrapped in transport retry.
pub fn discover_providers(config: &Config) -> Vec<Arc<dyn ModelProvider>> {
    let mut providers: Vec<Arc<dyn ModelProvider>> = Vec::new();

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        providers.push(Arc::new(OpenAIProvider::new(key)));
    }
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        providers.push(Arc::new(AnthropicProvider::new(key)));
    }

    for endpoint in KNOWN_ENDPOINTS {
        match endpoint.api_key_env {
            Some(var) => {
                if let Ok(key) = std::env::var(var) {
                    providers.push(Arc::new(OpenAICompatProvider::from_known(endpoint, Some(key))));
                }
            }
            // Keyless local servers are only used when a backend names them.
            None => {
                let referenced = config
                    .backends
                    .iter()
                    .any(|b| b.model.starts_with(&format!("{}/", endpoint.id)));
                if referenced {
                    providers.push(Arc::new(OpenAICompatProvider::from_known(endpoint, None)));
                }
            }
        }
    }

    for custom in &config.providers {
        let key = match &custom.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(k) => Some(k),
                Err(_) => {
                    tracing::warn!(provider = %custom.id, env = %var, "API key variable not set, skipping");
                    continue;
                }
            },
            None => None,
        };
        providers.push(Arc::new(OpenAICompatProvider::new(
            custom.id.clone(),
            custom.id.clone(),
            key,
            custom.base_url.clone(),
        )));
    }

    let retry = RetryConfig::from(&config.retry);
    let providers: Vec<Arc<dyn ModelProvider>> = providers
        .into_iter()
        .map(|p| Arc::new(RetryProvider::with_config(p, retry.clone())) as Arc<dyn ModelProvider>)
        .collect();

    tracing::debug!(
        providers = ?providers.iter().map(|p| p.id().to_string()).collect::<Vec<_>>(),
        "Discovered providers"
    );
    providers
}

/// Find a specific provider by ID.
pub fn find_provider<'a>(
    providers: &'a [Arc<dyn ModelProvider>],
    provider_id: &str,
) -> Option<&'a Arc<dyn ModelProvider>> {
    providers.iter().find(|p| p.id() == provider_id)
}

/// Resolve one "provider/model" reference into a backend.
pub fn resolve_backend(
    model: &str,
    structured: Option<bool>,
    providers: &[Arc<dyn ModelProvider>],
    settings: &ReasoningSettings,
) -> Result<Backend, ReasonError> {
    let model_ref = ModelRef::parse(model).ok_or_else(|| {
        ReasonError::Config(format!("model '{}' is not in provider/model form", model))
    })?;
    let provider = find_provider(providers, &model_ref.provider)
        .ok_or_else(|| ReasonError::UnknownProvider(model_ref.provider.clone()))?
        .clone();
    let capability = match structured {
        Some(true) => Capability::Structured,
        Some(false) => Capability::Raw,
        None => default_capability(&model_ref.provider),
    };
    Ok(Backend::new(model_ref, provider, capability).with_limits(
        settings.context_limit,
        settings.temperature,
        settings.request_timeout,
    ))
}

/// Resolve the configured fan-out set, in order.
pub fn resolve_backends(
    configs: &[BackendConfig],
    providers: &[Arc<dyn ModelProvider>],
    settings: &ReasoningSettings,
) -> Result<Vec<Backend>, ReasonError> {
    if configs.is_empty() {
        return Err(ReasonError::NoBackends);
    }
    configs
        .iter()
        .map(|c| resolve_backend(&c.model, c.structured, providers, settings))
        .collect()
}

/// Entries of the default fan-out whose provider is available.
pub fn default_backend_configs(providers: &[Arc<dyn ModelProvider>]) -> Vec<BackendConfig> {
    DEFAULT_FANOUT
        .iter()
        .filter(|m| {
            ModelRef::parse(m).is_some_and(|r| find_provider(providers, &r.provider).is_some())
        })
        .map(|m| BackendConfig {
            model: m.to_string(),
            structured: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatRequest, ChatResponse};
    use async_trait::async_trait;

    struct NamedProvider(&'static str);

    #[async_trait]
    impl ModelProvider for NamedProvider {
        fn id(&self) -> &str {
            self.0
        }
        fn name(&self) -> &str {
            self.0
        }
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ReasonError> {
            Err(ReasonError::Provider {
                provider: self.0.into(),
                message: "unused".into(),
                retriable: false,
            })
        }
    }

    fn providers() -> Vec<Arc<dyn ModelProvider>> {
        vec![
            Arc::new(NamedProvider("openai")),
            Arc::new(NamedProvider("groq")),
        ]
    }

    #[test]
    fn test_resolve_backend_default_capability() {
        let settings = ReasoningSettings::default();
        let b = resolve_backend("openai/gpt-4o-2024-08-06", None, &providers(), &settings).unwrap();
        assert_eq!(b.capability(), Capability::Structured);
        assert_eq!(b.id(), "openai/gpt-4o-2024-08-06");

        let b = resolve_backend("groq/llama-3.1-70b-versatile", None, &providers(), &settings)
            .unwrap();
        assert_eq!(b.capability(), Capability::Raw);
    }

    #[test]
    fn test_resolve_backend_explicit_capability() {
        let settings = ReasoningSettings::default();
        let b = resolve_backend("openai/gpt-4-turbo", Some(false), &providers(), &settings).unwrap();
        assert_eq!(b.capability(), Capability::Raw);
    }

    #[test]
    fn test_resolve_backend_errors() {
        let settings = ReasoningSettings::default();
        assert!(matches!(
            resolve_backend("mistral/large", None, &providers(), &settings),
            Err(ReasonError::UnknownProvider(p)) if p == "mistral"
        ));
        assert!(matches!(
            resolve_backend("gpt-4o", None, &providers(), &settings),
            Err(ReasonError::Config(_))
        ));
        assert!(matches!(
            resolve_backends(&[], &providers(), &settings),
            Err(ReasonError::NoBackends)
        ));
    }

    #[test]
    fn test_default_backend_configs_filters_unavailable() {
        let configs = default_backend_configs(&providers());
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].model, "openai/gpt-4o-2024-08-06");
    }

    #[test]
    fn test_resolve_backends_preserves_order() {
        let settings = ReasoningSettings::default();
        let configs = vec![
            BackendConfig {
                model: "groq/a".into(),
                structured: None,
            },
            BackendConfig {
                model: "openai/b".into(),
                structured: None,
            },
        ];
        let backends = resolve_backends(&configs, &providers(), &settings).unwrap();
        let ids: Vec<&str> = backends.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec!["groq/a", "openai/b"]);
    }
}
