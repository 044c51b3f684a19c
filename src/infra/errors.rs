// src/infra/errors.rs — Error types for thinkchain

use thiserror::Error;

use crate::core::thought::ThoughtError;

#[derive(Error, Debug)]
pub enum ReasonError {
    // Transport errors (retriable at the provider layer only)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Backend '{backend}' timed out after {after_ms}ms")]
    Timeout { backend: String, after_ms: u64 },

    #[error("Step {step} exceeded its deadline of {after_ms}ms")]
    StepDeadline { step: usize, after_ms: u64 },

    // Contract violations (fatal to the step)
    #[error("Malformed ranking: {0}")]
    MalformedRanking(String),

    #[error("Thought contract violated: {0}")]
    Thought(#[from] ThoughtError),

    #[error("Ranking service is closed")]
    RankingClosed,

    // Configuration
    #[error("No backends configured. Add [[backends]] to config.toml or pass --model.")]
    NoBackends,

    #[error("Provider '{0}' not available. Set its API key or add it under [[providers]].")]
    UnknownProvider(String),

    #[error("Invalid trajectory record: {0}")]
    InvalidRecord(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReasonError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ReasonError::Provider {
                retriable: true,
                ..
            } | ReasonError::RateLimited { .. }
        )
    }
}
