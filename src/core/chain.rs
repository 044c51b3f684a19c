// src/core/chain.rs — Ordered reasoning trajectory

use super::thought::Thought;
use super::token_budget::estimate_tokens;
use super::types::Role;

/// A problem, an optional system instruction, and the thoughts committed
/// so far. Thoughts are only ever appended.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtChain {
    initial_question: String,
    system_message: Option<String>,
    thoughts: Vec<Thought>,
}

impl ThoughtChain {
    pub fn new(initial_question: impl Into<String>, system_message: Option<String>) -> Self {
        Self {
            initial_question: initial_question.into(),
            system_message,
            thoughts: Vec::new(),
        }
    }

    pub fn initial_question(&self) -> &str {
        &self.initial_question
    }

    pub fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref()
    }

    pub fn add_thought(&mut self, thought: Thought) {
        self.thoughts.push(thought);
    }

    pub fn thoughts(&self) -> &[Thought] {
        &self.thoughts
    }

    pub fn last(&self) -> Option<&Thought> {
        self.thoughts.last()
    }

    pub fn len(&self) -> usize {
        self.thoughts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
    }

    /// The last thought chose an external question and answered it with
    /// real model output. A fallback answer never ends the chain.
    pub fn is_terminal(&self) -> bool {
        self.last().is_some_and(|t| {
            t.chosen_role() == Some(Role::External)
                && t.chosen_answer().is_some_and(|a| !a.is_fallback())
        })
    }

    pub fn final_answer(&self) -> Option<&str> {
        if !self.is_terminal() {
            return None;
        }
        self.last()
            .and_then(|t| t.chosen_answer())
            .map(|c| c.text.as_str())
    }

    /// Tokens along the committed path: chosen questions and answers only.
    pub fn chosen_path_token_count(&self) -> u32 {
        self.thoughts
            .iter()
            .map(|t| {
                let q = t.chosen_question().map_or(0, |c| estimate_tokens(&c.text));
                let a = t.chosen_answer().map_or(0, |c| estimate_tokens(&c.text));
                q + a
            })
            .sum()
    }

    /// Tokens across every generated candidate, chosen or not.
    pub fn generated_token_count(&self) -> u32 {
        self.thoughts
            .iter()
            .map(|t| {
                let questions: u32 = t
                    .questions()
                    .iter()
                    .map(|c| {
                        estimate_tokens(&c.text)
                            + c.role.map_or(0, |r| estimate_tokens(&r.to_string()))
                    })
                    .sum();
                let answers: u32 = t.answers().iter().map(|c| estimate_tokens(&c.text)).sum();
                questions + answers
            })
            .sum()
    }

    /// Chosen (question, answer) pairs in order. Thoughts missing either
    /// side are skipped.
    pub fn previous_steps(&self) -> impl Iterator<Item = (&str, &str)> {
        self.thoughts.iter().filter_map(|t| {
            let q = t.chosen_question()?;
            let a = t.chosen_answer()?;
            Some((q.text.as_str(), a.text.as_str()))
        })
    }
}
