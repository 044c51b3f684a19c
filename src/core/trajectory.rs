// src/core/trajectory.rs — Trajectory records (JSONL) and reconstruction

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::chain::ThoughtChain;
use super::thought::Thought;
use super::types::{Candidate, Ranking, Role, RunStatus};
use crate::infra::errors::ReasonError;
use crate::provider::TokenUsage;

/// One run, flattened. Field names are the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub id: String,
    pub initial_question: String,
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub thoughts: Vec<ThoughtRecord>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub ranking_model: Option<String>,
    pub context_limit: u32,
    pub token_limit: u32,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtRecord {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(rename = "role", default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub question_rankings: Vec<usize>,
    #[serde(default)]
    pub chosen_question_idx: Option<usize>,
    #[serde(default)]
    pub chosen_question: Option<String>,
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default)]
    pub answer_rankings: Vec<usize>,
    #[serde(default)]
    pub chosen_answer_idx: Option<usize>,
    #[serde(default)]
    pub chosen_answer: Option<String>,
}

/// Run settings and totals stored next to the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMeta {
    pub models: Vec<String>,
    pub ranking_model: Option<String>,
    pub context_limit: u32,
    pub token_limit: u32,
    pub interactive: bool,
    pub status: Option<RunStatus>,
    pub usage: TokenUsage,
}

impl ThoughtRecord {
    fn from_thought(thought: &Thought) -> Self {
        Self {
            questions: thought.questions().iter().map(|c| c.text.clone()).collect(),
            roles: thought
                .questions()
                .iter()
                .map(|c| c.role.unwrap_or(Role::Invalid))
                .collect(),
            question_rankings: thought
                .question_ranking()
                .map(|r| r.order().to_vec())
                .unwrap_or_default(),
            chosen_question_idx: thought.chosen_question_idx().map(|i| i.get()),
            chosen_question: thought.chosen_question().map(|c| c.text.clone()),
            answers: thought.answers().iter().map(|c| c.text.clone()).collect(),
            answer_rankings: thought
                .answer_ranking()
                .map(|r| r.order().to_vec())
                .unwrap_or_default(),
            chosen_answer_idx: thought.chosen_answer_idx().map(|i| i.get()),
            chosen_answer: thought.chosen_answer().map(|c| c.text.clone()),
        }
    }

    fn to_thought(&self, step: usize, models: &[String]) -> Result<Thought, ReasonError> {
        let invalid = |what: String| ReasonError::InvalidRecord(format!("thought {}: {}", step, what));
        let provenance = |i: usize| models.get(i).cloned().unwrap_or_else(|| "unknown".into());

        if self.roles.len() != self.questions.len() {
            return Err(invalid(format!(
                "{} questions but {} roles",
                self.questions.len(),
                self.roles.len()
            )));
        }

        let mut thought = Thought::new();
        for (i, (text, role)) in self.questions.iter().zip(&self.roles).enumerate() {
            thought.push_question(Candidate::question(text.clone(), *role, provenance(i)))?;
        }
        if !self.question_rankings.is_empty() {
            let ranking = Ranking::from_order(self.question_rankings.clone(), self.questions.len())
                .map_err(|e| invalid(e.to_string()))?;
            thought.set_question_ranking(ranking)?;
        }
        restore_choice(
            self.chosen_question_idx,
            self.chosen_question.as_deref(),
            thought.questions(),
            "question",
        )
        .map_err(invalid)?;
        if let Some(idx) = self.chosen_question_idx {
            thought.choose_question(idx)?;
        }

        for (i, text) in self.answers.iter().enumerate() {
            thought.push_answer(Candidate::answer(text.clone(), provenance(i)))?;
        }
        if !self.answer_rankings.is_empty() {
            let ranking = Ranking::from_order(self.answer_rankings.clone(), self.answers.len())
                .map_err(|e| invalid(e.to_string()))?;
            thought.set_answer_ranking(ranking)?;
        }
        restore_choice(
            self.chosen_answer_idx,
            self.chosen_answer.as_deref(),
            thought.answers(),
            "answer",
        )
        .map_err(invalid)?;
        if let Some(idx) = self.chosen_answer_idx {
            thought.choose_answer(idx)?;
        }

        Ok(thought)
    }
}

/// Check a stored choice against the candidate list it points into.
fn restore_choice(
    idx: Option<usize>,
    text: Option<&str>,
    candidates: &[Candidate],
    what: &str,
) -> Result<(), String> {
    match (idx, text) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(format!("chosen {} text without an index", what)),
        (Some(i), _) if i >= candidates.len() => Err(format!(
            "chosen {} index {} out of range for {} candidates",
            what,
            i,
            candidates.len()
        )),
        (Some(i), Some(t)) if candidates[i].text != t => {
            Err(format!("chosen {} text does not match candidate {}", what, i))
        }
        (Some(_), _) => Ok(()),
    }
}

impl TrajectoryRecord {
    pub fn from_chain(id: &str, chain: &ThoughtChain, meta: &RunMeta) -> Self {
        Self {
            id: id.to_string(),
            initial_question: chain.initial_question().to_string(),
            system_message: chain.system_message().map(str::to_string),
            response: chain.final_answer().map(str::to_string),
            status: meta.status,
            thoughts: chain.thoughts().iter().map(ThoughtRecord::from_thought).collect(),
            models: meta.models.clone(),
            ranking_model: meta.ranking_model.clone(),
            context_limit: meta.context_limit,
            token_limit: meta.token_limit,
            interactive: meta.interactive,
            input_tokens: meta.usage.input_tokens,
            output_tokens: meta.usage.output_tokens,
        }
    }

    pub fn to_json_line(&self) -> Result<String, ReasonError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_line(line: &str) -> Result<Self, ReasonError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// A chain rebuilt from a record, with its run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub id: String,
    pub chain: ThoughtChain,
    pub meta: RunMeta,
}

impl Trajectory {
    /// Rebuild the chain without calling any backend. Every index and
    /// ranking is validated.
    pub fn from_record(record: &TrajectoryRecord) -> Result<Self, ReasonError> {
        let mut chain = ThoughtChain::new(
            record.initial_question.clone(),
            record.system_message.clone(),
        );
        for (i, tr) in record.thoughts.iter().enumerate() {
            chain.add_thought(tr.to_thought(i + 1, &record.models)?);
        }

        if record.response.is_some() && record.response.as_deref() != chain.final_answer() {
            return Err(ReasonError::InvalidRecord(
                "response does not match the chain's final answer".into(),
            ));
        }

        Ok(Self {
            id: record.id.clone(),
            chain,
            meta: RunMeta {
                models: record.models.clone(),
                ranking_model: record.ranking_model.clone(),
                context_limit: record.context_limit,
                token_limit: record.token_limit,
                interactive: record.interactive,
                status: record.status,
                usage: TokenUsage {
                    input_tokens: record.input_tokens,
                    output_tokens: record.output_tokens,
                },
            },
        })
    }

    pub fn to_record(&self) -> TrajectoryRecord {
        TrajectoryRecord::from_chain(&self.id, &self.chain, &self.meta)
    }
}

/// Append one record as a JSON line, creating the file and its parent
/// directories as needed.
pub fn append_record(path: &Path, record: &TrajectoryRecord) -> Result<(), ReasonError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let line = record.to_json_line()?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Read every record in a JSONL file. Lines that fail to parse are logged
/// and skipped.
pub fn read_records(path: &Path) -> Result<Vec<TrajectoryRecord>, ReasonError> {
    let file = std::fs::File::open(path)?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match TrajectoryRecord::from_json_line(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::error!(line = n + 1, error = %e, "Skipping unreadable trajectory record"),
        }
    }
    Ok(records)
}
