//! Category qualification quizzes.

mod bank;
mod session;
mod transition;

pub use bank::{BankFileError, load_quiz_bank, parse_quiz_bank};
pub use session::{QuizPhase, QuizSession, QuizStep, Reveal};
pub use transition::{DeferredTransition, Fired};
