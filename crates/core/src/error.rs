use thiserror::Error;

use crate::model::{CategoryError, IdError, QuestionError, ScoreError, ThresholdError};
use crate::quiz_bank::QuizBankError;

/// Umbrella for every validation failure raised by the domain model.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    QuizBank(#[from] QuizBankError),
}
