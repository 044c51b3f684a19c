// src/core/ranking.rs — Ranking oracles and the ranking service
//
// An oracle orders one step's candidates best to worst. The controller only
// sees `RankingService`, which owns the oracle's open/close lifecycle and
// short-circuits rankings that need no oracle call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::fanout::{retry_parse, PromptPair};
use super::schema::{parse_ranking, ResponseSchema};
use super::token_budget::estimate_tokens;
use super::types::{Candidate, CandidateKind, Ranking, MAX_CANDIDATES};
use crate::infra::config::AnswerRankTarget;
use crate::infra::errors::ReasonError;
use crate::provider::backend::{Backend, Capability};
use crate::provider::TokenUsage;

pub struct RankRequest<'a> {
    pub step: usize,
    pub kind: CandidateKind,
    /// Ranking prompt for LLM oracles.
    pub prompts: &'a PromptPair,
    /// Problem text, plus the chosen question when ranking answers.
    pub context: &'a str,
    pub candidates: &'a [Candidate],
}

#[derive(Debug, Clone)]
pub struct RankOutput {
    pub ranking: Ranking,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait RankingOracle: Send + Sync {
    /// Identifier recorded in trajectories.
    fn id(&self) -> &str;

    async fn open(&self) -> Result<(), ReasonError> {
        Ok(())
    }

    async fn close(&self) {}

    async fn rank(&self, request: &RankRequest<'_>) -> Result<RankOutput, ReasonError>;
}

/// Asks a model for a `{best, ..., worst}` object over the labels.
pub struct LlmRanker {
    question_backend: Backend,
    answer_backend: Backend,
    validation_retries: u32,
}

impl LlmRanker {
    pub fn new(ranking_backend: Backend, validation_retries: u32) -> Self {
        Self {
            answer_backend: ranking_backend.clone(),
            question_backend: ranking_backend,
            validation_retries,
        }
    }

    /// Pick which backend ranks answers.
    pub fn with_answer_target(mut self, target: AnswerRankTarget, fanout: &[Backend]) -> Self {
        if let (AnswerRankTarget::FirstBackend, Some(first)) = (target, fanout.first()) {
            self.answer_backend = first.clone();
        }
        self
    }

    fn backend_for(&self, kind: CandidateKind) -> &Backend {
        match kind {
            CandidateKind::Question => &self.question_backend,
            CandidateKind::Answer => &self.answer_backend,
        }
    }
}

#[async_trait]
impl RankingOracle for LlmRanker {
    fn id(&self) -> &str {
        self.question_backend.id()
    }

    async fn rank(&self, request: &RankRequest<'_>) -> Result<RankOutput, ReasonError> {
        let backend = self.backend_for(request.kind);
        let width = request.candidates.len();
        let schema = ResponseSchema::Ranking { width };
        let prompt = request.prompts.for_capability(backend.capability());

        let result = retry_parse(self.validation_retries, |attempt| {
            let schema = schema;
            async move {
                let reply = match backend.capability() {
                    Capability::Structured => backend.call_structured(prompt, &schema).await?,
                    Capability::Raw => backend.call_raw(prompt).await?,
                };
                let parsed = parse_ranking(&reply.content, width);
                if let Err(e) = &parsed {
                    tracing::warn!(
                        backend = backend.id(),
                        step = request.step,
                        attempt,
                        error = %e,
                        "Failed to parse ranking"
                    );
                }
                Ok::<_, ReasonError>((parsed, reply.usage))
            }
        })
        .await?;

        let labels = result.outcome.map_err(|e| {
            ReasonError::MalformedRanking(format!(
                "no parseable {} ranking from {} after {} attempts: {}",
                request.kind,
                backend.id(),
                result.attempts,
                e
            ))
        })?;
        let ranking = Ranking::from_labels(&labels, width)?;

        Ok(RankOutput {
            ranking,
            usage: result.usage,
        })
    }
}

/// A preference model that scores each candidate against a context.
#[async_trait]
pub trait PreferenceScorer: Send + Sync {
    fn id(&self) -> &str;

    async fn open(&self) -> Result<(), ReasonError> {
        Ok(())
    }

    async fn close(&self) {}

    async fn score(&self, context: &str, candidates: &[&str]) -> Result<Vec<f32>, ReasonError>;
}

/// Orders candidates by descending score.
pub struct ScoreRanker {
    scorer: Arc<dyn PreferenceScorer>,
}

impl ScoreRanker {
    pub fn new(scorer: Arc<dyn PreferenceScorer>) -> Self {
        Self { scorer }
    }
}

/// Indices sorted by score, highest first. Ties keep the lower index first;
/// NaN sorts last.
pub fn argsort_descending(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        let sa = if scores[a].is_nan() { f32::NEG_INFINITY } else { scores[a] };
        let sb = if scores[b].is_nan() { f32::NEG_INFINITY } else { scores[b] };
        sb.total_cmp(&sa)
    });
    order
}

#[async_trait]
impl RankingOracle for ScoreRanker {
    fn id(&self) -> &str {
        self.scorer.id()
    }

    async fn open(&self) -> Result<(), ReasonError> {
        self.scorer.open().await
    }

    async fn close(&self) {
        self.scorer.close().await
    }

    async fn rank(&self, request: &RankRequest<'_>) -> Result<RankOutput, ReasonError> {
        let texts: Vec<&str> = request.candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = self.scorer.score(request.context, &texts).await?;
        if scores.len() != texts.len() {
            return Err(ReasonError::MalformedRanking(format!(
                "scorer returned {} scores for {} candidates",
                scores.len(),
                texts.len()
            )));
        }
        tracing::debug!(step = request.step, kind = %request.kind, ?scores, "Scored candidates");

        let ranking = Ranking::from_order(argsort_descending(&scores), texts.len())?;
        let usage = TokenUsage {
            input_tokens: estimate_tokens(request.context)
                + texts.iter().map(|t| estimate_tokens(t)).sum::<u32>(),
            output_tokens: texts.len() as u32,
        };
        Ok(RankOutput { ranking, usage })
    }
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    context: &'a str,
    candidates: &'a [&'a str],
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<f32>,
}

/// Client for a locally hosted reward-model server:
/// `POST {base}/score` and `GET {base}/health`.
pub struct HttpScorer {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpScorer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn error(&self, message: impl Into<String>) -> ReasonError {
        ReasonError::Provider {
            provider: "scorer".into(),
            message: message.into(),
            retriable: false,
        }
    }
}

#[async_trait]
impl PreferenceScorer for HttpScorer {
    fn id(&self) -> &str {
        &self.base_url
    }

    async fn open(&self) -> Result<(), ReasonError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.error(format!("health check failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(self.error(format!("health check returned {}", response.status())));
        }
        Ok(())
    }

    async fn score(&self, context: &str, candidates: &[&str]) -> Result<Vec<f32>, ReasonError> {
        let response = self
            .client
            .post(format!("{}/score", self.base_url))
            .timeout(self.timeout)
            .json(&ScoreRequest { context, candidates })
            .send()
            .await
            .map_err(|e| self.error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.error(format!("HTTP {}", response.status())));
        }
        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("bad score response: {}", e)))?;
        Ok(body.scores)
    }
}

/// Lifecycle wrapper handed to the controller.
pub struct RankingService {
    oracle: Arc<dyn RankingOracle>,
    active: AtomicBool,
}

impl RankingService {
    /// Open the oracle (warm-up or health check) and wrap it.
    pub async fn open(oracle: Arc<dyn RankingOracle>) -> Result<Self, ReasonError> {
        oracle.open().await?;
        tracing::info!(oracle = oracle.id(), "Ranking service open");
        Ok(Self {
            oracle,
            active: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &str {
        self.oracle.id()
    }

    pub fn is_open(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn rank(&self, request: &RankRequest<'_>) -> Result<RankOutput, ReasonError> {
        if !self.is_open() {
            return Err(ReasonError::RankingClosed);
        }
        let n = request.candidates.len();
        if n > MAX_CANDIDATES {
            return Err(ReasonError::MalformedRanking(format!(
                "{} candidates exceed the {} available labels",
                n, MAX_CANDIDATES
            )));
        }
        if n <= 1 || request.candidates.iter().all(Candidate::is_fallback) {
            tracing::debug!(step = request.step, kind = %request.kind, n, "Trivial ranking, oracle skipped");
            return Ok(RankOutput {
                ranking: Ranking::identity(n),
                usage: TokenUsage::default(),
            });
        }

        let output = self.oracle.rank(request).await?;
        if output.ranking.len() != n {
            return Err(ReasonError::MalformedRanking(format!(
                "oracle ranked {} of {} candidates",
                output.ranking.len(),
                n
            )));
        }
        Ok(output)
    }

    pub async fn close(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.oracle.close().await;
            tracing::info!(oracle = self.oracle.id(), "Ranking service closed");
        }
    }
}
