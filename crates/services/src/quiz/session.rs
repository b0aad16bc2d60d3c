use std::sync::Arc;

use crosspoint_core::QuizQuestion;
use crosspoint_core::model::{Category, QuizResult};

use crate::error::QuizError;

/// Where a quiz currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizPhase {
    /// Waiting for the user to pick and submit an option.
    Answering { index: usize },
    /// The correct answer is shown; the next question is pending.
    Revealed { index: usize, correct: bool },
    /// The deferred transition fired and is being applied.
    Advancing { index: usize, correct: bool },
    Completed(QuizResult),
    Cancelled,
}

/// Outcome of submitting the selected option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    pub index: usize,
    pub selected: String,
    pub answer: String,
    pub correct: bool,
    /// Score once this answer is counted.
    pub score_after: u32,
}

/// Outcome of applying a reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizStep {
    Next { index: usize },
    Completed(QuizResult),
}

/// One run through a category's quiz.
///
/// Score only changes when a revealed answer is applied, so a cancelled
/// transition never counts.
#[derive(Debug, Clone)]
pub struct QuizSession {
    category: Category,
    questions: Arc<[QuizQuestion]>,
    selected: Option<String>,
    score: u32,
    phase: QuizPhase,
}

impl QuizSession {
    /// # Errors
    ///
    /// Returns `QuizError::UnknownCategory` when `questions` is empty.
    pub fn new(category: Category, questions: Arc<[QuizQuestion]>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::UnknownCategory(category.to_string()));
        }
        Ok(Self {
            category,
            questions,
            selected: None,
            score: 0,
            phase: QuizPhase::Answering { index: 0 },
        })
    }

    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    #[must_use]
    pub fn phase(&self) -> &QuizPhase {
        &self.phase
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self.phase {
            QuizPhase::Answering { index }
            | QuizPhase::Revealed { index, .. }
            | QuizPhase::Advancing { index, .. } => Some(index),
            QuizPhase::Completed(_) | QuizPhase::Cancelled => None,
        }
    }

    /// The question on screen, if any.
    #[must_use]
    pub fn current(&self) -> Option<&QuizQuestion> {
        self.index().and_then(|i| self.questions.get(i))
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, QuizPhase::Completed(_) | QuizPhase::Cancelled)
    }

    /// Pick an option. Ignored unless the current question is still being
    /// answered and `choice` is one of its options.
    pub fn select(&mut self, choice: &str) -> bool {
        let QuizPhase::Answering { index } = self.phase else {
            return false;
        };
        let listed = self
            .questions
            .get(index)
            .is_some_and(|q| q.has_option(choice));
        if listed {
            self.selected = Some(choice.to_string());
        }
        listed
    }

    /// Reveal the correct answer for the selected option.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotAnswering` outside the answering phase and
    /// `QuizError::NoSelection` when nothing is picked.
    pub fn submit(&mut self) -> Result<Reveal, QuizError> {
        let index = match self.phase {
            QuizPhase::Answering { index } => index,
            QuizPhase::Completed(_) | QuizPhase::Cancelled => return Err(QuizError::Finished),
            QuizPhase::Revealed { .. } | QuizPhase::Advancing { .. } => {
                return Err(QuizError::NotAnswering);
            }
        };
        let selected = self.selected.clone().ok_or(QuizError::NoSelection)?;
        let question = self.questions.get(index).ok_or(QuizError::Finished)?;
        let correct = question.is_correct(&selected);
        self.phase = QuizPhase::Revealed { index, correct };
        Ok(Reveal {
            index,
            answer: question.answer().to_string(),
            selected,
            correct,
            score_after: self.score + u32::from(correct),
        })
    }

    /// Mark the pending transition as firing.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotRevealed` unless an answer is revealed.
    pub fn begin_advance(&mut self) -> Result<(), QuizError> {
        match self.phase {
            QuizPhase::Revealed { index, correct } => {
                self.phase = QuizPhase::Advancing { index, correct };
                Ok(())
            }
            QuizPhase::Completed(_) | QuizPhase::Cancelled => Err(QuizError::Finished),
            _ => Err(QuizError::NotRevealed),
        }
    }

    /// Count the revealed answer and move on.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotRevealed` unless an answer is revealed or
    /// advancing, and `QuizError::Finished` once the quiz is over.
    pub fn advance(&mut self) -> Result<QuizStep, QuizError> {
        let (index, correct) = match self.phase {
            QuizPhase::Revealed { index, correct } | QuizPhase::Advancing { index, correct } => {
                (index, correct)
            }
            QuizPhase::Completed(_) | QuizPhase::Cancelled => return Err(QuizError::Finished),
            QuizPhase::Answering { .. } => return Err(QuizError::NotRevealed),
        };
        if correct {
            self.score += 1;
        }
        self.selected = None;

        let next = index + 1;
        if next < self.questions.len() {
            self.phase = QuizPhase::Answering { index: next };
            return Ok(QuizStep::Next { index: next });
        }

        let total = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let result = QuizResult::new(self.category.clone(), self.score, total)
            .map_err(|_| QuizError::Finished)?;
        self.phase = QuizPhase::Completed(result.clone());
        Ok(QuizStep::Completed(result))
    }

    /// Abandon the quiz. Returns `false` if it had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.phase = QuizPhase::Cancelled;
        self.selected = None;
        true
    }
}
