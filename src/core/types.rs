// src/core/types.rs — Core domain types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infra::config::ReasoningConfig;
use crate::infra::errors::ReasonError;

/// Marker text carried by candidates that never parsed.
pub const FALLBACK_TEXT: &str = "Parsing Error after retries";

/// Upper bound on candidates per step (one label per letter).
pub const MAX_CANDIDATES: usize = 26;

/// Whether a question asks for another reasoning step or for the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Internal,
    External,
    /// Only on fallback question candidates.
    Invalid,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Internal => write!(f, "internal"),
            Role::External => write!(f, "external"),
            Role::Invalid => write!(f, "invalid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Question,
    Answer,
}

impl std::fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateKind::Question => write!(f, "question"),
            CandidateKind::Answer => write!(f, "answer"),
        }
    }
}

/// One generated option for a step, with the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub backend: String,
    /// Set on question candidates only.
    pub role: Option<Role>,
}

impl Candidate {
    pub fn question(text: impl Into<String>, role: Role, backend: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            backend: backend.into(),
            role: Some(role),
        }
    }

    pub fn answer(text: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            backend: backend.into(),
            role: None,
        }
    }

    pub fn fallback(kind: CandidateKind, backend: impl Into<String>) -> Self {
        match kind {
            CandidateKind::Question => Self::question(FALLBACK_TEXT, Role::Invalid, backend),
            CandidateKind::Answer => Self::answer(FALLBACK_TEXT, backend),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.text == FALLBACK_TEXT && matches!(self.role, None | Some(Role::Invalid))
    }
}

/// Index into a thought's candidate list. Only `Thought` hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateIdx(pub(crate) usize);

impl CandidateIdx {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Candidate label for a slot: 0 -> 'a', 1 -> 'b', ...
pub fn label_for(index: usize) -> Option<char> {
    if index < MAX_CANDIDATES {
        Some((b'a' + index as u8) as char)
    } else {
        None
    }
}

/// Slot for a label, accepting surrounding whitespace and upper case.
pub fn index_for(label: &str) -> Option<usize> {
    let label = label.trim();
    let mut chars = label.chars();
    let c = chars.next()?.to_ascii_lowercase();
    if chars.next().is_some() || !c.is_ascii_lowercase() {
        return None;
    }
    Some((c as u8 - b'a') as usize)
}

/// A best-to-worst order over `n` candidates. Always a permutation of `0..n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking(Vec<usize>);

impl Ranking {
    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// Validate `order` as a permutation of `0..n`.
    pub fn from_order(order: Vec<usize>, n: usize) -> Result<Self, ReasonError> {
        if order.len() != n {
            return Err(ReasonError::MalformedRanking(format!(
                "expected {} entries, got {}",
                n,
                order.len()
            )));
        }
        let mut seen = vec![false; n];
        for &idx in &order {
            if idx >= n {
                return Err(ReasonError::MalformedRanking(format!(
                    "index {} out of range for {} candidates",
                    idx, n
                )));
            }
            if seen[idx] {
                return Err(ReasonError::MalformedRanking(format!(
                    "index {} ranked more than once",
                    idx
                )));
            }
            seen[idx] = true;
        }
        Ok(Self(order))
    }

    /// Validate a best-to-worst list of labels.
    pub fn from_labels<S: AsRef<str>>(labels: &[S], n: usize) -> Result<Self, ReasonError> {
        let order = labels
            .iter()
            .map(|l| {
                index_for(l.as_ref()).ok_or_else(|| {
                    ReasonError::MalformedRanking(format!("unknown label '{}'", l.as_ref()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_order(order, n)
    }

    pub fn best(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn order(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { answer: String },
    ExceededBudget,
    BackendFailure { detail: String },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Success { .. } => RunStatus::TerminalSuccess,
            RunOutcome::ExceededBudget => RunStatus::ExceededBudget,
            RunOutcome::BackendFailure { .. } => RunStatus::OtherFailure,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            RunOutcome::Success { answer } => Some(answer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    TerminalSuccess,
    ExceededBudget,
    OtherFailure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::TerminalSuccess => write!(f, "TERMINAL_SUCCESS"),
            RunStatus::ExceededBudget => write!(f, "EXCEEDED_BUDGET"),
            RunStatus::OtherFailure => write!(f, "OTHER_FAILURE"),
        }
    }
}

/// Lifecycle events emitted by the controller.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    StepStart {
        step: usize,
        chosen_path_tokens: u32,
    },
    QuestionChosen {
        step: usize,
        index: usize,
        backend: String,
        role: Role,
        question: String,
    },
    AnswerChosen {
        step: usize,
        index: usize,
        backend: String,
        answer: String,
    },
    Finished {
        steps: usize,
        status: RunStatus,
        input_tokens: u32,
        output_tokens: u32,
    },
}

/// Runtime knobs for the reasoning loop.
#[derive(Debug, Clone)]
pub struct ReasoningSettings {
    pub context_limit: u32,
    pub token_limit: u32,
    pub token_limit_buffer: u32,
    pub validation_retries: u32,
    pub interactive: bool,
    pub temperature: f32,
    pub request_timeout: Duration,
    pub step_timeout: Duration,
    pub max_steps: Option<usize>,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self::from(&ReasoningConfig::default())
    }
}

impl From<&ReasoningConfig> for ReasoningSettings {
    fn from(cfg: &ReasoningConfig) -> Self {
        Self {
            context_limit: cfg.context_limit,
            token_limit: cfg.token_limit,
            token_limit_buffer: cfg.token_limit_buffer,
            validation_retries: cfg.validation_retries,
            interactive: cfg.interactive,
            temperature: cfg.temperature,
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            step_timeout: Duration::from_secs(cfg.step_timeout_secs),
            max_steps: cfg.max_steps,
        }
    }
}
