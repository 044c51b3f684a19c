// src/core/fanout.rs — Concurrent candidate generation across backends

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::schema::{parse_answer, parse_question, strip_code_fence, ParseError, ResponseSchema};
use super::types::{Candidate, CandidateKind};
use crate::infra::errors::ReasonError;
use crate::provider::backend::{Backend, Capability, Reply};
use crate::provider::TokenUsage;
use crate::util::preview;

/// The same prompt rendered without and with inline format instructions.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub plain: Arc<str>,
    pub with_format: Arc<str>,
}

impl PromptPair {
    pub fn new(plain: impl Into<Arc<str>>, with_format: impl Into<Arc<str>>) -> Self {
        Self {
            plain: plain.into(),
            with_format: with_format.into(),
        }
    }

    /// The variant a backend of this capability should receive.
    pub fn for_capability(&self, capability: Capability) -> &str {
        match capability {
            Capability::Structured => &*self.plain,
            Capability::Raw => &*self.with_format,
        }
    }
}

/// Result of the bounded parse-retry loop.
#[derive(Debug)]
pub struct Attempts<T> {
    pub outcome: Result<T, ParseError>,
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// Run `attempt` until it parses, at most `max_attempts` times. Usage from
/// every attempt is summed. Errors from `attempt` itself abort immediately.
pub async fn retry_parse<T, F, Fut>(max_attempts: u32, mut attempt: F) -> Result<Attempts<T>, ReasonError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(Result<T, ParseError>, TokenUsage), ReasonError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut usage = TokenUsage::default();
    let mut last_error = ParseError::NoJson;

    for n in 1..=max_attempts {
        let (outcome, spent) = attempt(n).await?;
        usage.add(&spent);
        match outcome {
            Ok(value) => {
                return Ok(Attempts {
                    outcome: Ok(value),
                    usage,
                    attempts: n,
                })
            }
            Err(e) => {
                tracing::debug!(attempt = n, max_attempts, error = %e, "Parse attempt failed");
                last_error = e;
            }
        }
    }

    Ok(Attempts {
        outcome: Err(last_error),
        usage,
        attempts: max_attempts,
    })
}

/// One backend's contribution to a step.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub candidate: Candidate,
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// Fans one prompt out to every backend and joins the results back in
/// backend order.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    validation_retries: u32,
    step_timeout: Duration,
}

impl CandidateGenerator {
    pub fn new(validation_retries: u32, step_timeout: Duration) -> Self {
        Self {
            validation_retries,
            step_timeout,
        }
    }

    pub async fn generate(
        &self,
        step: usize,
        kind: CandidateKind,
        prompts: &PromptPair,
        backends: &[Backend],
    ) -> Result<Vec<GenerationReport>, ReasonError> {
        let mut tasks = JoinSet::new();
        for (slot, backend) in backends.iter().cloned().enumerate() {
            let prompts = prompts.clone();
            let retries = self.validation_retries;
            tasks.spawn(async move { (slot, generate_one(&backend, kind, &prompts, retries).await) });
        }

        let mut slots: Vec<Option<GenerationReport>> = (0..backends.len()).map(|_| None).collect();
        let joined = tokio::time::timeout(self.step_timeout, async {
            while let Some(next) = tasks.join_next().await {
                let (slot, result) = next.map_err(|e| {
                    ReasonError::Other(anyhow::anyhow!("generation task failed: {}", e))
                })?;
                slots[slot] = Some(result?);
            }
            Ok::<(), ReasonError>(())
        })
        .await;

        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(e);
            }
            Err(_) => {
                tasks.abort_all();
                tracing::error!(step, kind = %kind, "Step deadline elapsed, aborting outstanding calls");
                return Err(ReasonError::StepDeadline {
                    step,
                    after_ms: self.step_timeout.as_millis() as u64,
                });
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(slot, report)| {
                report.ok_or_else(|| {
                    ReasonError::Other(anyhow::anyhow!("backend slot {} produced no result", slot))
                })
            })
            .collect()
    }
}

async fn call(backend: &Backend, kind: CandidateKind, prompts: &PromptPair) -> Result<Reply, ReasonError> {
    let schema = match kind {
        CandidateKind::Question => ResponseSchema::Question,
        CandidateKind::Answer => ResponseSchema::Answer,
    };
    let prompt = prompts.for_capability(backend.capability());
    match backend.capability() {
        Capability::Structured => backend.call_structured(prompt, &schema).await,
        Capability::Raw => backend.call_raw(prompt).await,
    }
}

fn to_candidate(kind: CandidateKind, content: &str, backend: &str) -> Result<Candidate, ParseError> {
    match kind {
        CandidateKind::Question => {
            let q = parse_question(content)?;
            Ok(Candidate::question(q.question, q.role, backend))
        }
        CandidateKind::Answer => {
            let a = parse_answer(content)?;
            Ok(Candidate::answer(strip_code_fence(&a.answer), backend))
        }
    }
}

async fn generate_one(
    backend: &Backend,
    kind: CandidateKind,
    prompts: &PromptPair,
    retries: u32,
) -> Result<GenerationReport, ReasonError> {
    let result = retry_parse(retries, |attempt| async move {
        let reply = call(backend, kind, prompts).await?;
        let parsed = to_candidate(kind, &reply.content, backend.id());
        if let Err(e) = &parsed {
            tracing::warn!(
                backend = backend.id(),
                kind = %kind,
                attempt,
                max_attempts = retries,
                error = %e,
                response = %preview(&reply.content, 200),
                "Failed to parse response"
            );
        }
        Ok::<_, ReasonError>((parsed, reply.usage))
    })
    .await?;

    let candidate = match result.outcome {
        Ok(candidate) => candidate,
        Err(_) => {
            tracing::warn!(
                backend = backend.id(),
                kind = %kind,
                attempts = result.attempts,
                "Parse retries exhausted, using fallback candidate"
            );
            Candidate::fallback(kind, backend.id())
        }
    };

    Ok(GenerationReport {
        candidate,
        usage: result.usage,
        attempts: result.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Role, FALLBACK_TEXT};
    use crate::provider::{ChatRequest, ChatResponse, ModelProvider, ModelRef, StopReason};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replies with `bad` for the first `failures` calls, then with `good`.
    struct ScriptedProvider {
        good: String,
        failures: u32,
        delay: Duration,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(good: &str, failures: u32, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                good: good.into(),
                failures,
                delay: Duration::from_millis(delay_ms),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "mock"
        }
        fn name(&self) -> &str {
            "Mock"
        }
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ReasonError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let content = if n < self.failures {
                "I think the answer is probably 4.".to_string()
            } else {
                self.good.clone()
            };
            Ok(ChatResponse {
                content,
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
                stop_reason: StopReason::EndTurn,
            })
        }
    }

    fn backend(name: &str, provider: Arc<ScriptedProvider>) -> Backend {
        Backend::new(ModelRef::new("mock", name), provider, Capability::Raw)
    }

    fn prompts() -> PromptPair {
        PromptPair::new("plain", "with format")
    }

    #[tokio::test]
    async fn test_retry_parse_counts_attempts() {
        let result = retry_parse(3, |n| async move {
            let outcome = if n < 3 {
                Err(ParseError::NoJson)
            } else {
                Ok(n)
            };
            Ok::<_, ReasonError>((outcome, TokenUsage { input_tokens: 1, output_tokens: 1 }))
        })
        .await
        .unwrap();
        assert_eq!(result.outcome, Ok(3));
        assert_eq!(result.attempts, 3);
        assert_eq!(result.usage.total(), 6);
    }

    #[tokio::test]
    async fn test_retry_parse_propagates_fatal() {
        let result: Result<Attempts<u32>, _> = retry_parse(3, |_| async {
            Err::<(Result<u32, ParseError>, TokenUsage), _>(ReasonError::Timeout {
                backend: "x".into(),
                after_ms: 1,
            })
        })
        .await;
        assert!(matches!(result, Err(ReasonError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_results_in_backend_order() {
        let q = |s: &str| format!("{{\"question\": \"{}\", \"role\": \"internal\"}}", s);
        let backends = vec![
            backend("a", ScriptedProvider::new(&q("from a"), 0, 10)),
            backend("b", ScriptedProvider::new(&q("from b"), 0, 50)),
            backend("c", ScriptedProvider::new(&q("from c"), 0, 5)),
        ];
        let generator = CandidateGenerator::new(3, Duration::from_secs(5));
        let reports = generator
            .generate(1, CandidateKind::Question, &prompts(), &backends)
            .await
            .unwrap();
        let texts: Vec<&str> = reports.iter().map(|r| r.candidate.text.as_str()).collect();
        assert_eq!(texts, vec!["from a", "from b", "from c"]);
        assert_eq!(reports[1].candidate.backend, "mock/b");
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let provider = ScriptedProvider::new("{\"answer\": \"4\"}", 2, 0);
        let backends = vec![backend("a", provider.clone())];
        let generator = CandidateGenerator::new(3, Duration::from_secs(5));
        let reports = generator
            .generate(1, CandidateKind::Answer, &prompts(), &backends)
            .await
            .unwrap();
        assert_eq!(reports[0].candidate.text, "4");
        assert_eq!(reports[0].attempts, 3);
        assert_eq!(reports[0].usage.input_tokens, 30);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fallback_after_exhausted_retries() {
        let provider = ScriptedProvider::new("{}", 100, 0);
        let backends = vec![backend("a", provider.clone())];
        let generator = CandidateGenerator::new(3, Duration::from_secs(5));
        let reports = generator
            .generate(1, CandidateKind::Question, &prompts(), &backends)
            .await
            .unwrap();
        let c = &reports[0].candidate;
        assert_eq!(c.text, FALLBACK_TEXT);
        assert_eq!(c.role, Some(Role::Invalid));
        assert!(c.is_fallback());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_answer_code_fence_stripped() {
        let provider = ScriptedProvider::new(
            "{\"answer\": \"```python\\nprint(4)\\n```\"}",
            0,
            0,
        );
        let generator = CandidateGenerator::new(1, Duration::from_secs(5));
        let reports = generator
            .generate(1, CandidateKind::Answer, &prompts(), &[backend("a", provider)])
            .await
            .unwrap();
        assert_eq!(reports[0].candidate.text, "print(4)");
    }

    #[tokio::test]
    async fn test_step_deadline_aborts() {
        let slow = ScriptedProvider::new("{\"answer\": \"4\"}", 0, 500);
        let generator = CandidateGenerator::new(1, Duration::from_millis(20));
        let err = generator
            .generate(7, CandidateKind::Answer, &prompts(), &[backend("slow", slow)])
            .await
            .unwrap_err();
        assert!(matches!(err, ReasonError::StepDeadline { step: 7, after_ms: 20 }));
    }

    #[test]
    fn test_prompt_pair_selection() {
        let p = prompts();
        assert_eq!(p.for_capability(Capability::Structured), "plain");
        assert_eq!(p.for_capability(Capability::Raw), "with format");
    }
}
