//! Static quiz content: category name to an ordered list of questions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::model::Category;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizBankError {
    #[error("quiz question text cannot be empty")]
    EmptyPrompt,

    #[error("quiz question {prompt:?} has an empty option")]
    EmptyOption { prompt: String },

    #[error("answer to {prompt:?} is not one of its options")]
    AnswerMissing { prompt: String },

    #[error("answer to {prompt:?} appears more than once among its options")]
    AnswerRepeated { prompt: String },

    #[error("category {0} has no questions")]
    NoQuestions(String),

    #[error("category {0} is defined twice")]
    DuplicateCategory(String),

    #[error("\"General\" cannot carry a quiz")]
    GeneralHasQuiz,
}

/// One multiple-choice question.
///
/// The answer is one of the options, by exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizQuestion {
    prompt: String,
    options: Vec<String>,
    answer: String,
}

impl QuizQuestion {
    /// # Errors
    ///
    /// Returns `QuizBankError` if the prompt or an option is blank, or the
    /// answer does not appear exactly once among the options.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        answer: impl Into<String>,
    ) -> Result<Self, QuizBankError> {
        let prompt = prompt.into();
        let answer = answer.into();
        if prompt.trim().is_empty() {
            return Err(QuizBankError::EmptyPrompt);
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(QuizBankError::EmptyOption { prompt });
        }
        match options.iter().filter(|o| **o == answer).count() {
            0 => return Err(QuizBankError::AnswerMissing { prompt }),
            1 => {}
            _ => return Err(QuizBankError::AnswerRepeated { prompt }),
        }
        Ok(Self {
            prompt,
            options,
            answer,
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Case-sensitive exact comparison against the answer.
    #[must_use]
    pub fn is_correct(&self, choice: &str) -> bool {
        self.answer == choice
    }

    #[must_use]
    pub fn has_option(&self, choice: &str) -> bool {
        self.options.iter().any(|o| o == choice)
    }
}

/// Immutable lookup table of quizzes, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizBank {
    quizzes: BTreeMap<Category, Arc<[QuizQuestion]>>,
}

impl QuizBank {
    /// # Errors
    ///
    /// Returns `QuizBankError` for an empty or duplicated category, or a quiz
    /// attached to "General".
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Category, Vec<QuizQuestion>)>,
    ) -> Result<Self, QuizBankError> {
        let mut quizzes = BTreeMap::new();
        for (category, questions) in entries {
            if category.is_general() {
                return Err(QuizBankError::GeneralHasQuiz);
            }
            if questions.is_empty() {
                return Err(QuizBankError::NoQuestions(category.to_string()));
            }
            if quizzes.contains_key(&category) {
                return Err(QuizBankError::DuplicateCategory(category.to_string()));
            }
            quizzes.insert(category, Arc::from(questions));
        }
        Ok(Self { quizzes })
    }

    /// The quizzes that ship with the application.
    #[must_use]
    pub fn builtin() -> Self {
        let quizzes = BUILTIN
            .iter()
            .filter_map(|(name, questions)| {
                let category = Category::new(*name).ok()?;
                let questions: Vec<QuizQuestion> = questions
                    .iter()
                    .filter_map(|(prompt, options, answer)| {
                        let options = options.iter().map(ToString::to_string).collect();
                        QuizQuestion::new(*prompt, options, *answer).ok()
                    })
                    .collect();
                Some((category, Arc::from(questions)))
            })
            .collect();
        Self { quizzes }
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.quizzes.keys()
    }

    /// Categories a question may be posted under: every quiz category plus "General".
    #[must_use]
    pub fn postable_categories(&self) -> Vec<Category> {
        let mut all: Vec<Category> = self.quizzes.keys().cloned().collect();
        all.push(Category::general());
        all
    }

    #[must_use]
    pub fn questions(&self, category: &Category) -> Option<Arc<[QuizQuestion]>> {
        self.quizzes.get(category).map(Arc::clone)
    }

    #[must_use]
    pub fn has_quiz(&self, category: &Category) -> bool {
        self.quizzes.contains_key(category)
    }

    #[must_use]
    pub fn is_postable(&self, category: &Category) -> bool {
        category.is_general() || self.has_quiz(category)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.quizzes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quizzes.is_empty()
    }
}

type BuiltinQuestion = (&'static str, &'static [&'static str], &'static str);

const BUILTIN: &[(&str, &[BuiltinQuestion])] = &[
    (
        "Physics",
        &[
            (
                "What is the SI unit of force?",
                &["Joule", "Newton", "Watt", "Pascal"],
                "Newton",
            ),
            (
                "Which quantity is conserved in an elastic collision but not in an inelastic one?",
                &["Momentum", "Kinetic energy", "Mass", "Electric charge"],
                "Kinetic energy",
            ),
            (
                "What is the approximate speed of light in a vacuum?",
                &["3 x 10^8 m/s", "3 x 10^6 m/s", "3 x 10^5 km/s", "3 x 10^10 m/s"],
                "3 x 10^8 m/s",
            ),
        ],
    ),
    (
        "Financial Modeling",
        &[(
            "What does NPV stand for?",
            &[
                "Net Present Value",
                "Net Projected Value",
                "Nominal Present Value",
                "Net Price Variance",
            ],
            "Net Present Value",
        )],
    ),
    (
        "Computer Science",
        &[
            (
                "What is the worst-case time complexity of binary search?",
                &["O(1)", "O(log n)", "O(n)", "O(n log n)"],
                "O(log n)",
            ),
            (
                "Which data structure is last-in, first-out?",
                &["Queue", "Stack", "Heap", "Linked list"],
                "Stack",
            ),
            (
                "What does SQL stand for?",
                &[
                    "Structured Query Language",
                    "Sequential Query Logic",
                    "Standard Question Language",
                    "System Query Layer",
                ],
                "Structured Query Language",
            ),
        ],
    ),
    (
        "Biology",
        &[
            (
                "Which organelle produces most of a cell's ATP?",
                &["Nucleus", "Ribosome", "Mitochondrion", "Golgi apparatus"],
                "Mitochondrion",
            ),
            (
                "Which base pairs with adenine in DNA?",
                &["Cytosine", "Guanine", "Uracil", "Thymine"],
                "Thymine",
            ),
        ],
    ),
];
