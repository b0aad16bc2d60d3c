use std::path::Path;

use crosspoint_core::model::{Category, CategoryError};
use crosspoint_core::{QuizBank, QuizBankError, QuizQuestion};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BankFileError {
    #[error("cannot read quiz bank {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed quiz bank: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Bank(#[from] QuizBankError),
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    category: String,
    questions: Vec<QuestionEntry>,
}

#[derive(Debug, Deserialize)]
struct QuestionEntry {
    question: String,
    options: Vec<String>,
    answer: String,
}

/// Parse a quiz bank from its JSON form:
/// `[{"category": .., "questions": [{"question", "options", "answer"}]}]`.
///
/// # Errors
///
/// Returns `BankFileError` for malformed JSON or a bank that fails validation.
pub fn parse_quiz_bank(json: &str) -> Result<QuizBank, BankFileError> {
    let entries: Vec<CategoryEntry> = serde_json::from_str(json)?;
    let mut quizzes = Vec::with_capacity(entries.len());
    for entry in entries {
        let category = Category::new(entry.category)?;
        let questions = entry
            .questions
            .into_iter()
            .map(|q| QuizQuestion::new(q.question, q.options, q.answer))
            .collect::<Result<Vec<_>, _>>()?;
        quizzes.push((category, questions));
    }
    Ok(QuizBank::from_entries(quizzes)?)
}

/// Load the bank at `path`, or the built-in bank when no path is given.
///
/// # Errors
///
/// Returns `BankFileError` if the file cannot be read or parsed.
pub fn load_quiz_bank(path: Option<&Path>) -> Result<QuizBank, BankFileError> {
    let Some(path) = path else {
        return Ok(QuizBank::builtin());
    };
    let json = std::fs::read_to_string(path).map_err(|source| BankFileError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let bank = parse_quiz_bank(&json)?;
    tracing::info!(path = %path.display(), categories = bank.len(), "loaded quiz bank");
    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_categories_and_questions() {
        let bank = parse_quiz_bank(
            r#"[{"category": "Chemistry", "questions": [
                {"question": "H2O is?", "options": ["Water", "Salt"], "answer": "Water"}
            ]}]"#,
        )
        .unwrap();
        let chemistry = Category::new("Chemistry").unwrap();
        assert!(bank.has_quiz(&chemistry));
        assert_eq!(bank.questions(&chemistry).unwrap().len(), 1);
    }

    #[test]
    fn answer_must_be_an_option() {
        let err = parse_quiz_bank(
            r#"[{"category": "Chemistry", "questions": [
                {"question": "H2O is?", "options": ["Water", "Salt"], "answer": "Ice"}
            ]}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, BankFileError::Bank(_)));
    }

    #[test]
    fn missing_path_falls_back_to_builtin() {
        let bank = load_quiz_bank(None).unwrap();
        assert_eq!(bank.len(), QuizBank::builtin().len());
    }
}
