// src/core/prompts.rs — Prompt kinds and the default prompt builder

use super::chain::ThoughtChain;
use super::schema::ResponseSchema;
use super::types::{label_for, Candidate, Role};
use crate::infra::errors::ReasonError;

/// Which prompt the controller needs next.
#[derive(Debug, Clone, Copy)]
pub enum PromptKind<'a> {
    InitialQuestion,
    FollowupQuestion,
    InternalAnswer { question: &'a str },
    ExternalAnswer { question: &'a str },
    ExternalAnswerWithSystem { question: &'a str },
    RankQuestions { candidates: &'a [Candidate] },
    RankAnswers { question: &'a str, candidates: &'a [Candidate] },
}

impl<'a> PromptKind<'a> {
    /// Response shape the prompt asks for.
    pub fn schema(&self) -> ResponseSchema {
        match self {
            PromptKind::InitialQuestion | PromptKind::FollowupQuestion => ResponseSchema::Question,
            PromptKind::InternalAnswer { .. }
            | PromptKind::ExternalAnswer { .. }
            | PromptKind::ExternalAnswerWithSystem { .. } => ResponseSchema::Answer,
            PromptKind::RankQuestions { candidates } | PromptKind::RankAnswers { candidates, .. } => {
                ResponseSchema::Ranking {
                    width: candidates.len(),
                }
            }
        }
    }

    /// Answer prompt for a chosen question. Fallback questions (role
    /// `invalid`) are answered like internal ones.
    pub fn answer_for(role: Role, question: &'a str, has_system: bool) -> PromptKind<'a> {
        match role {
            Role::External if has_system => PromptKind::ExternalAnswerWithSystem { question },
            Role::External => PromptKind::ExternalAnswer { question },
            Role::Internal | Role::Invalid => PromptKind::InternalAnswer { question },
        }
    }
}

pub trait PromptBuilder: Send + Sync {
    fn build(
        &self,
        chain: &ThoughtChain,
        kind: &PromptKind<'_>,
        include_format_hint: bool,
    ) -> Result<String, ReasonError>;
}

/// Instruction-style prompts with quoted sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

impl PromptBuilder for DefaultPrompts {
    fn build(
        &self,
        chain: &ThoughtChain,
        kind: &PromptKind<'_>,
        include_format_hint: bool,
    ) -> Result<String, ReasonError> {
        let mut prompt = String::with_capacity(2048);

        match kind {
            PromptKind::InitialQuestion => {
                append_block(&mut prompt, "Instruction", INITIAL_QUESTION);
                append_block(
                    &mut prompt,
                    "Example",
                    "- Problem: ... a complex coding problem ...\n\
                     - Output: What behaviour is the code expected to have?",
                );
                append_block(&mut prompt, "Problem", chain.initial_question());
            }
            PromptKind::FollowupQuestion => {
                append_block(&mut prompt, "Instruction", FOLLOWUP_QUESTION);
                append_block(
                    &mut prompt,
                    "Example No.1",
                    "- Problem: ... a complex coding problem ...\n\
                     - Previous Steps: ... enough reasoning to solve the problem ...\n\
                     - Output: Given the reasoning above, what is the final solution to the problem?",
                );
                append_block(
                    &mut prompt,
                    "Example No.2",
                    "- Problem: ... a complex coding problem ...\n\
                     - Previous Steps: ... not yet enough reasoning ...\n\
                     - Output: How would an ABC algorithm solve XYZ?",
                );
                append_block(&mut prompt, "Problem", chain.initial_question());
                append_previous_steps(&mut prompt, chain);
            }
            PromptKind::InternalAnswer { question } => {
                append_block(&mut prompt, "Instruction", INTERNAL_ANSWER);
                append_block(&mut prompt, "Initial Problem Statement", chain.initial_question());
                append_previous_steps(&mut prompt, chain);
                append_block(&mut prompt, "Current Question", &format!("- {}", question));
            }
            PromptKind::ExternalAnswer { question } => {
                append_block(&mut prompt, "Instruction", EXTERNAL_ANSWER);
                append_block(&mut prompt, "Initial Problem Statement", chain.initial_question());
                append_previous_steps(&mut prompt, chain);
                append_block(&mut prompt, "Current Question", &format!("- {}", question));
            }
            PromptKind::ExternalAnswerWithSystem { question } => {
                let system = chain.system_message().ok_or_else(|| {
                    ReasonError::Prompt("system-instruction prompt requested without one".into())
                })?;
                append_block(&mut prompt, "Instruction", EXTERNAL_ANSWER_WITH_SYSTEM);
                append_block(&mut prompt, "Initial Problem Statement", chain.initial_question());
                append_previous_steps(&mut prompt, chain);
                append_block(&mut prompt, "System Message", &format!("- {}", system));
                append_block(&mut prompt, "Current Question", &format!("- {}", question));
            }
            PromptKind::RankQuestions { candidates } => {
                let labels = label_list(candidates.len())?;
                append_block(
                    &mut prompt,
                    "Instruction",
                    &format!(
                        "- Below are the initial problem statement, the previous steps of reasoning, and the current questions.\n\
                         - The current questions, labelled {}, each propose what to ask next.\n\
                         - Order every label from the most to the least important question to ask next.\n\
                         - Weigh the role of each question:\n\
                         \x20   - Prefer (role: internal) when more reasoning is needed before the problem can be solved.\n\
                         \x20   - Prefer (role: external) when the problem is simple or the previous steps already suffice.",
                        labels
                    ),
                );
                append_block(&mut prompt, "Initial Problem Statement", chain.initial_question());
                append_previous_steps(&mut prompt, chain);
                let listed = candidates
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        let role = c.role.map(|r| r.to_string()).unwrap_or_default();
                        format!("- {}: {} (role: {})", letter(i), c.text, role)
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                append_block(&mut prompt, "Current Questions", &listed);
            }
            PromptKind::RankAnswers {
                question,
                candidates,
            } => {
                let labels = label_list(candidates.len())?;
                append_block(
                    &mut prompt,
                    "Instruction",
                    &format!(
                        "- Below are the initial problem statement, the previous steps of reasoning, the current question, and candidate answers to it.\n\
                         - The candidate answers are labelled {}.\n\
                         - Order every label from the answer that best addresses the current question to the one that addresses it worst.",
                        labels
                    ),
                );
                append_block(&mut prompt, "Initial Problem Statement", chain.initial_question());
                append_previous_steps(&mut prompt, chain);
                append_block(&mut prompt, "Current Question", &format!("- {}", question));
                let listed = candidates
                    .iter()
                    .enumerate()
                    .map(|(i, c)| format!("- {}: {}", letter(i), c.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                append_block(&mut prompt, "Current Answers", &listed);
            }
        }

        if include_format_hint {
            append_block(&mut prompt, "Output Format", &kind.schema().format_hint());
        }

        Ok(prompt.trim_end().to_string())
    }
}

const INITIAL_QUESTION: &str = "\
- Break the given problem into multiple steps of thought.
- If the problem is simple enough to need no real reasoning, ask a question that solves it directly.
- Otherwise, ask the first reasoning step you would take, phrased as a question.
- Return exactly one question and do not answer it yourself.
- \"question\": your question.
- \"role\": \"internal\" for a reasoning step, \"external\" for a question that solves the problem directly.";

const FOLLOWUP_QUESTION: &str = "\
- Break the given problem into multiple steps of thought.
- Below are the initial problem and the previous steps of reasoning.
- If the previous steps are enough to solve the problem, ask a question that finally solves it.
- Otherwise, ask the next reasoning step you would take, phrased as a question.
- Return exactly one question and do not answer it yourself.
- \"question\": your question.
- \"role\": \"internal\" for the next reasoning step, \"external\" for a question that finally solves the problem.";

const INTERNAL_ANSWER: &str = "\
- Answer the current question as well as you can.
- Use the initial problem statement and the previous steps of reasoning.
- Return exactly one answer and nothing else.
- If you are unsure, say so in your answer.
- \"answer\": your answer.";

const EXTERNAL_ANSWER: &str = "\
- Answer the current question so that it solves the initial problem statement.
- Use the initial problem statement and the previous steps of reasoning.
- Return exactly one answer and nothing else.
- \"answer\": your answer.";

const EXTERNAL_ANSWER_WITH_SYSTEM: &str = "\
- Answer the current question so that it solves the initial problem statement.
- Use the initial problem statement and the previous steps of reasoning.
- Return exactly one answer and nothing else.
- Follow the system message for the required form of your answer.
- \"answer\": your answer.";

fn append_block(prompt: &mut String, title: &str, body: &str) {
    prompt.push_str(title);
    prompt.push_str(":\n\"\"\"\n");
    prompt.push_str(body.trim());
    prompt.push_str("\n\"\"\"\n\n");
}

fn append_previous_steps(prompt: &mut String, chain: &ThoughtChain) {
    for (i, (question, answer)) in chain.previous_steps().enumerate() {
        append_block(
            prompt,
            &format!("Previous Step No.{}", i + 1),
            &format!("- Question: {}\n- Answer: {}", question, answer),
        );
    }
}

fn letter(index: usize) -> char {
    label_for(index).unwrap_or('?')
}

fn label_list(n: usize) -> Result<String, ReasonError> {
    let labels: Vec<String> = (0..n)
        .map(|i| {
            label_for(i)
                .map(|c| c.to_string())
                .ok_or_else(|| ReasonError::Prompt(format!("{} candidates exceed the label set", n)))
        })
        .collect::<Result<_, _>>()?;
    Ok(labels.join(", "))
}
