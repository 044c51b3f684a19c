// src/core/thought.rs — One reasoning step: candidates, rankings, choices

use thiserror::Error;

use super::types::{Candidate, CandidateIdx, CandidateKind, Ranking, Role};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThoughtError {
    #[error("index {index} out of range for {len} candidates")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{0} candidates are already ranked")]
    Sealed(CandidateKind),

    #[error("ranking covers {ranking} candidates but {len} exist")]
    RankingMismatch { ranking: usize, len: usize },

    #[error("no {0} has been chosen")]
    NotChosen(CandidateKind),
}

/// Candidate lists are append-only until ranked, then sealed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thought {
    questions: Vec<Candidate>,
    answers: Vec<Candidate>,
    question_ranking: Option<Ranking>,
    answer_ranking: Option<Ranking>,
    chosen_question: Option<CandidateIdx>,
    chosen_answer: Option<CandidateIdx>,
}

impl Thought {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_question(&mut self, candidate: Candidate) -> Result<CandidateIdx, ThoughtError> {
        if self.question_ranking.is_some() {
            return Err(ThoughtError::Sealed(CandidateKind::Question));
        }
        self.questions.push(candidate);
        Ok(CandidateIdx(self.questions.len() - 1))
    }

    pub fn push_answer(&mut self, candidate: Candidate) -> Result<CandidateIdx, ThoughtError> {
        if self.answer_ranking.is_some() {
            return Err(ThoughtError::Sealed(CandidateKind::Answer));
        }
        self.answers.push(candidate);
        Ok(CandidateIdx(self.answers.len() - 1))
    }

    pub fn set_question_ranking(&mut self, ranking: Ranking) -> Result<(), ThoughtError> {
        check_ranking(&ranking, self.questions.len())?;
        self.question_ranking = Some(ranking);
        Ok(())
    }

    pub fn set_answer_ranking(&mut self, ranking: Ranking) -> Result<(), ThoughtError> {
        check_ranking(&ranking, self.answers.len())?;
        self.answer_ranking = Some(ranking);
        Ok(())
    }

    pub fn choose_question(&mut self, index: usize) -> Result<CandidateIdx, ThoughtError> {
        let idx = checked(index, self.questions.len())?;
        self.chosen_question = Some(idx);
        Ok(idx)
    }

    pub fn choose_answer(&mut self, index: usize) -> Result<CandidateIdx, ThoughtError> {
        let idx = checked(index, self.answers.len())?;
        self.chosen_answer = Some(idx);
        Ok(idx)
    }

    pub fn questions(&self) -> &[Candidate] {
        &self.questions
    }

    pub fn answers(&self) -> &[Candidate] {
        &self.answers
    }

    pub fn question_ranking(&self) -> Option<&Ranking> {
        self.question_ranking.as_ref()
    }

    pub fn answer_ranking(&self) -> Option<&Ranking> {
        self.answer_ranking.as_ref()
    }

    pub fn chosen_question_idx(&self) -> Option<CandidateIdx> {
        self.chosen_question
    }

    pub fn chosen_answer_idx(&self) -> Option<CandidateIdx> {
        self.chosen_answer
    }

    pub fn chosen_question(&self) -> Option<&Candidate> {
        self.chosen_question.and_then(|i| self.questions.get(i.0))
    }

    pub fn chosen_role(&self) -> Option<Role> {
        self.chosen_question().and_then(|c| c.role)
    }

    pub fn chosen_answer(&self) -> Option<&Candidate> {
        self.chosen_answer.and_then(|i| self.answers.get(i.0))
    }
}

fn checked(index: usize, len: usize) -> Result<CandidateIdx, ThoughtError> {
    if index < len {
        Ok(CandidateIdx(index))
    } else {
        Err(ThoughtError::IndexOutOfRange { index, len })
    }
}

fn check_ranking(ranking: &Ranking, len: usize) -> Result<(), ThoughtError> {
    if ranking.len() != len {
        return Err(ThoughtError::RankingMismatch {
            ranking: ranking.len(),
            len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_questions() -> Thought {
        let mut t = Thought::new();
        t.push_question(Candidate::question("Q1", Role::Internal, "a"))
            .unwrap();
        t.push_question(Candidate::question("Q2", Role::External, "b"))
            .unwrap();
        t
    }

    #[test]
    fn test_choose_valid_index() {
        let mut t = two_questions();
        let idx = t.choose_question(1).unwrap();
        assert_eq!(idx.get(), 1);
        assert_eq!(t.chosen_question().unwrap().text, "Q2");
        assert_eq!(t.chosen_role(), Some(Role::External));
    }

    #[test]
    fn test_choose_out_of_range_fails_closed() {
        let mut t = two_questions();
        let err = t.choose_question(2).unwrap_err();
        assert_eq!(err, ThoughtError::IndexOutOfRange { index: 2, len: 2 });
        assert!(t.chosen_question().is_none());
        assert!(t.choose_answer(0).is_err());
    }

    #[test]
    fn test_ranked_list_is_sealed() {
        let mut t = two_questions();
        t.set_question_ranking(Ranking::identity(2)).unwrap();
        let err = t
            .push_question(Candidate::question("Q3", Role::Internal, "c"))
            .unwrap_err();
        assert_eq!(err, ThoughtError::Sealed(CandidateKind::Question));
        assert_eq!(t.questions().len(), 2);
        // Answers are still open.
        assert!(t.push_answer(Candidate::answer("A", "a")).is_ok());
    }

    #[test]
    fn test_ranking_must_cover_all_candidates() {
        let mut t = two_questions();
        let err = t.set_question_ranking(Ranking::identity(3)).unwrap_err();
        assert_eq!(err, ThoughtError::RankingMismatch { ranking: 3, len: 2 });
        assert!(t.question_ranking().is_none());
    }

    #[test]
    fn test_unchosen_accessors_are_none() {
        let t = two_questions();
        assert!(t.chosen_question().is_none());
        assert!(t.chosen_role().is_none());
        assert!(t.chosen_answer().is_none());
        assert!(t.chosen_answer_idx().is_none());
    }
}
