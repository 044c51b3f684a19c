// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Fan-out set, in candidate-label order.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub retry: RetryPolicyConfig,

    /// Extra OpenAI-compatible endpoints, addressed by `id` in model refs.
    #[serde(default)]
    pub providers: Vec<CustomProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// `max_tokens` sent with every generation request.
    pub context_limit: u32,
    /// Cap on the chosen-path token count.
    pub token_limit: u32,
    /// Headroom kept below `token_limit` before a new step is refused.
    pub token_limit_buffer: u32,
    pub validation_retries: u32,
    pub interactive: bool,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub step_timeout_secs: u64,
    /// Hard cap on reasoning steps. Unset means the token budget is the only stop.
    #[serde(default)]
    pub max_steps: Option<usize>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            context_limit: 4096,
            token_limit: 4096,
            token_limit_buffer: 1000,
            validation_retries: 3,
            interactive: false,
            temperature: 1.0,
            request_timeout_secs: 120,
            step_timeout_secs: 600,
            max_steps: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// "provider/model"
    pub model: String,
    /// Whether the backend honours a JSON schema natively. Unset defers to
    /// the provider's default.
    #[serde(default)]
    pub structured: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankerKind {
    Llm,
    Scorer,
}

/// Which backend the LLM ranker consults when ordering answer candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerRankTarget {
    /// Always the first fan-out backend, whichever question was chosen.
    FirstBackend,
    /// The designated ranking backend, same as for questions.
    RankingBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub kind: RankerKind,
    /// Ranking backend ("provider/model"). Defaults to the first fan-out backend.
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub structured: Option<bool>,
    pub answer_target: AnswerRankTarget,
    /// Base URL of a locally hosted preference scorer (kind = "scorer").
    #[serde(default)]
    pub scorer_url: Option<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            kind: RankerKind::Llm,
            backend: None,
            structured: None,
            answer_target: AnswerRankTarget::FirstBackend,
            scorer_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomProviderConfig {
    pub id: String,
    pub base_url: String,
    /// Environment variable holding the API key. Omit for keyless local servers.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        match paths::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Ranking backend ref, falling back to the first fan-out backend.
    pub fn ranking_model(&self) -> Option<&str> {
        self.ranking
            .backend
            .as_deref()
            .or_else(|| self.backends.first().map(|b| b.model.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.reasoning.context_limit, 4096);
        assert_eq!(c.reasoning.token_limit, 4096);
        assert_eq!(c.reasoning.token_limit_buffer, 1000);
        assert_eq!(c.reasoning.validation_retries, 3);
        assert!(!c.reasoning.interactive);
        assert!(c.reasoning.max_steps.is_none());
        assert!(c.backends.is_empty());
        assert_eq!(c.ranking.kind, RankerKind::Llm);
        assert_eq!(c.ranking.answer_target, AnswerRankTarget::FirstBackend);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.reasoning.token_limit, 4096);
        assert!(config.ranking_model().is_none());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[reasoning]
context_limit = 8192
token_limit = 8192
token_limit_buffer = 500
validation_retries = 5
interactive = true
temperature = 0.7
request_timeout_secs = 30
step_timeout_secs = 90
max_steps = 12

[[backends]]
model = "openai/gpt-4o-2024-08-06"
structured = true

[[backends]]
model = "anthropic/claude-3-5-sonnet-20240620"

[ranking]
kind = "llm"
backend = "openai/gpt-4o-mini"
answer_target = "ranking-backend"

[retry]
max_retries = 1
initial_delay_ms = 100
max_delay_ms = 1000

[[providers]]
id = "local"
base_url = "http://127.0.0.1:8000/v1"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.reasoning.context_limit, 8192);
        assert_eq!(config.reasoning.validation_retries, 5);
        assert_eq!(config.reasoning.max_steps, Some(12));
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].structured, Some(true));
        assert!(config.backends[1].structured.is_none());
        assert_eq!(config.ranking_model(), Some("openai/gpt-4o-mini"));
        assert_eq!(config.ranking.answer_target, AnswerRankTarget::RankingBackend);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.providers[0].id, "local");
        assert!(config.providers[0].api_key_env.is_none());
    }

    #[test]
    fn test_ranking_model_falls_back_to_first_backend() {
        let toml_str = r#"
[[backends]]
model = "groq/llama-3.1-70b-versatile"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ranking_model(), Some("groq/llama-3.1-70b-versatile"));
    }

    #[test]
    fn test_parse_scorer_ranking() {
        let toml_str = r#"
[ranking]
kind = "scorer"
scorer_url = "http://127.0.0.1:9000"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ranking.kind, RankerKind::Scorer);
        assert_eq!(config.ranking.answer_target, AnswerRankTarget::FirstBackend);
        assert_eq!(
            config.ranking.scorer_url.as_deref(),
            Some("http://127.0.0.1:9000")
        );
    }

    #[test]
    fn test_partial_reasoning_section_keeps_defaults() {
        let config: Config = toml::from_str("[reasoning]\ntoken_limit = 1000\n").unwrap();
        assert_eq!(config.reasoning.token_limit, 1000);
        assert_eq!(config.reasoning.context_limit, 4096);
        assert_eq!(config.reasoning.token_limit_buffer, 1000);
        assert_eq!(config.reasoning.validation_retries, 3);
        assert_eq!(config.reasoning.step_timeout_secs, 600);
    }

    #[test]
    fn test_partial_retry_section_keeps_defaults() {
        let config: Config = toml::from_str("[retry]\nmax_retries = 0\n").unwrap();
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.initial_delay_ms, 2_000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.reasoning.token_limit_buffer,
            config.reasoning.token_limit_buffer
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
