// src/core/controller.rs — The reasoning loop

use std::sync::Arc;

use super::chain::ThoughtChain;
use super::fanout::{CandidateGenerator, GenerationReport, PromptPair};
use super::prompts::{PromptBuilder, PromptKind};
use super::ranking::{RankRequest, RankingService};
use super::thought::{Thought, ThoughtError};
use super::token_budget::TokenBudget;
use super::trajectory::{RunMeta, Trajectory, TrajectoryRecord};
use super::types::*;
use crate::infra::errors::ReasonError;
use crate::provider::backend::Backend;
use crate::provider::TokenUsage;
use crate::util::preview;

/// Drives question/answer steps over a chain until it terminates, runs out
/// of budget, or a backend fails.
pub struct ReasoningController {
    request_id: String,
    chain: ThoughtChain,
    backends: Vec<Backend>,
    ranking: Arc<RankingService>,
    prompts: Arc<dyn PromptBuilder>,
    generator: CandidateGenerator,
    budget: TokenBudget,
    settings: ReasoningSettings,
    usage: TokenUsage,
    outcome: Option<RunOutcome>,
    /// Optional callback for real-time progress events.
    on_progress: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
}

impl ReasoningController {
    pub fn new(
        request_id: impl Into<String>,
        chain: ThoughtChain,
        backends: Vec<Backend>,
        ranking: Arc<RankingService>,
        prompts: Arc<dyn PromptBuilder>,
        settings: ReasoningSettings,
    ) -> Result<Self, ReasonError> {
        if backends.is_empty() {
            return Err(ReasonError::NoBackends);
        }
        if backends.len() > MAX_CANDIDATES {
            return Err(ReasonError::Config(format!(
                "{} backends configured, at most {} are supported",
                backends.len(),
                MAX_CANDIDATES
            )));
        }

        Ok(Self {
            request_id: request_id.into(),
            chain,
            backends,
            ranking,
            prompts,
            generator: CandidateGenerator::new(settings.validation_retries, settings.step_timeout),
            budget: TokenBudget::new(settings.token_limit, settings.token_limit_buffer),
            settings,
            usage: TokenUsage::default(),
            outcome: None,
            on_progress: None,
        })
    }

    /// Continue a reconstructed chain. Limits and the interactive flag come
    /// from the trajectory; usage counters carry over.
    pub fn resume(
        trajectory: Trajectory,
        backends: Vec<Backend>,
        ranking: Arc<RankingService>,
        prompts: Arc<dyn PromptBuilder>,
        mut settings: ReasoningSettings,
    ) -> Result<Self, ReasonError> {
        settings.context_limit = trajectory.meta.context_limit;
        settings.token_limit = trajectory.meta.token_limit;
        settings.interactive = trajectory.meta.interactive;
        let mut controller = Self::new(
            trajectory.id,
            trajectory.chain,
            backends,
            ranking,
            prompts,
            settings,
        )?;
        controller.usage = trajectory.meta.usage;
        Ok(controller)
    }

    /// Set a callback for real-time progress events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn chain(&self) -> &ThoughtChain {
        &self.chain
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Run steps until the chain is terminal, the budget is spent, or a
    /// step fails. A failed step leaves earlier thoughts in place.
    pub async fn think(&mut self) -> RunOutcome {
        if self.settings.interactive {
            tracing::info!(request_id = %self.request_id, problem = %self.chain.initial_question(), "Starting reasoning");
        }

        let outcome = loop {
            if let Some(answer) = self.chain.final_answer() {
                break RunOutcome::Success {
                    answer: answer.to_string(),
                };
            }

            let spent = self.chain.chosen_path_token_count();
            if self.budget.is_exceeded(spent) {
                tracing::warn!(
                    request_id = %self.request_id,
                    spent,
                    limit = self.budget.limit,
                    buffer = self.budget.buffer,
                    "Token budget exceeded"
                );
                break RunOutcome::ExceededBudget;
            }
            if let Some(max) = self.settings.max_steps {
                if self.chain.len() >= max {
                    tracing::warn!(request_id = %self.request_id, max_steps = max, "Step limit reached");
                    break RunOutcome::ExceededBudget;
                }
            }

            let step = self.chain.len() + 1;
            self.emit(ProgressEvent::StepStart {
                step,
                chosen_path_tokens: spent,
            });

            match self.step(step).await {
                Ok(thought) => self.chain.add_thought(thought),
                Err(e) => {
                    tracing::error!(request_id = %self.request_id, step, error = %e, "Step failed");
                    break RunOutcome::BackendFailure {
                        detail: e.to_string(),
                    };
                }
            }
        };

        self.emit(ProgressEvent::Finished {
            steps: self.chain.len(),
            status: outcome.status(),
            input_tokens: self.usage.input_tokens,
            output_tokens: self.usage.output_tokens,
        });
        tracing::info!(
            request_id = %self.request_id,
            status = %outcome.status(),
            steps = self.chain.len(),
            input_tokens = self.usage.input_tokens,
            output_tokens = self.usage.output_tokens,
            "Reasoning finished"
        );

        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn step(&mut self, step: usize) -> Result<Thought, ReasonError> {
        let mut thought = Thought::new();

        // Questions
        let kind = if self.chain.is_empty() {
            PromptKind::InitialQuestion
        } else {
            PromptKind::FollowupQuestion
        };
        let prompts = self.prompt_pair(&kind)?;
        let reports = self
            .generator
            .generate(step, CandidateKind::Question, &prompts, &self.backends)
            .await?;
        for report in reports {
            self.take_report(step, CandidateKind::Question, &report);
            thought.push_question(report.candidate)?;
        }

        let ranked = {
            let candidates = thought.questions();
            let prompts = self.prompt_pair(&PromptKind::RankQuestions { candidates })?;
            self.ranking
                .rank(&RankRequest {
                    step,
                    kind: CandidateKind::Question,
                    prompts: &prompts,
                    context: self.chain.initial_question(),
                    candidates,
                })
                .await?
        };
        self.usage.add(&ranked.usage);
        let best = ranked
            .ranking
            .best()
            .ok_or_else(|| ReasonError::MalformedRanking("empty question ranking".into()))?;
        thought.set_question_ranking(ranked.ranking)?;
        thought.choose_question(best)?;

        let chosen = thought
            .chosen_question()
            .ok_or(ThoughtError::NotChosen(CandidateKind::Question))?;
        let question = chosen.text.clone();
        let role = chosen.role.unwrap_or(Role::Invalid);
        if self.settings.interactive {
            tracing::info!(step, index = best, backend = %chosen.backend, %role, question = %question, "Chosen question");
        }
        self.emit(ProgressEvent::QuestionChosen {
            step,
            index: best,
            backend: chosen.backend.clone(),
            role,
            question: question.clone(),
        });

        // Answers
        let kind = PromptKind::answer_for(role, &question, self.chain.system_message().is_some());
        let prompts = self.prompt_pair(&kind)?;
        let reports = self
            .generator
            .generate(step, CandidateKind::Answer, &prompts, &self.backends)
            .await?;
        for report in reports {
            self.take_report(step, CandidateKind::Answer, &report);
            thought.push_answer(report.candidate)?;
        }

        let context = format!("{} {}", self.chain.initial_question(), question);
        let ranked = {
            let candidates = thought.answers();
            let prompts = self.prompt_pair(&PromptKind::RankAnswers {
                question: &question,
                candidates,
            })?;
            self.ranking
                .rank(&RankRequest {
                    step,
                    kind: CandidateKind::Answer,
                    prompts: &prompts,
                    context: &context,
                    candidates,
                })
                .await?
        };
        self.usage.add(&ranked.usage);
        let best = ranked
            .ranking
            .best()
            .ok_or_else(|| ReasonError::MalformedRanking("empty answer ranking".into()))?;
        thought.set_answer_ranking(ranked.ranking)?;
        thought.choose_answer(best)?;

        let chosen = thought
            .chosen_answer()
            .ok_or(ThoughtError::NotChosen(CandidateKind::Answer))?;
        if self.settings.interactive {
            tracing::info!(step, index = best, backend = %chosen.backend, answer = %chosen.text, "Chosen answer");
        }
        if role == Role::External && chosen.is_fallback() {
            tracing::warn!(
                request_id = %self.request_id,
                step,
                "Chosen final answer is a parse fallback, continuing"
            );
        }
        self.emit(ProgressEvent::AnswerChosen {
            step,
            index: best,
            backend: chosen.backend.clone(),
            answer: chosen.text.clone(),
        });

        Ok(thought)
    }

    fn prompt_pair(&self, kind: &PromptKind<'_>) -> Result<PromptPair, ReasonError> {
        Ok(PromptPair::new(
            self.prompts.build(&self.chain, kind, false)?,
            self.prompts.build(&self.chain, kind, true)?,
        ))
    }

    fn take_report(&mut self, step: usize, kind: CandidateKind, report: &GenerationReport) {
        self.usage.add(&report.usage);
        if self.settings.interactive {
            tracing::info!(
                step,
                kind = %kind,
                backend = %report.candidate.backend,
                attempts = report.attempts,
                role = ?report.candidate.role,
                text = %preview(&report.candidate.text, 500),
                "Candidate"
            );
        }
    }

    /// Snapshot of the run so far as a persistable record.
    pub fn to_record(&self) -> TrajectoryRecord {
        let meta = RunMeta {
            models: self.backends.iter().map(|b| b.id().to_string()).collect(),
            ranking_model: Some(self.ranking.id().to_string()),
            context_limit: self.settings.context_limit,
            token_limit: self.settings.token_limit,
            interactive: self.settings.interactive,
            status: self.outcome.as_ref().map(RunOutcome::status),
            usage: self.usage,
        };
        TrajectoryRecord::from_chain(&self.request_id, &self.chain, &meta)
    }
}
