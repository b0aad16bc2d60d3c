use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::{Category, UserId};

/// Minimum correct-answer ratio needed to earn verification.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PassingThreshold(f64);

impl PassingThreshold {
    pub const DEFAULT: f64 = 0.70;

    /// # Errors
    ///
    /// Returns `ThresholdError::OutOfRange` unless `0.0 <= ratio <= 1.0`.
    pub fn new(ratio: f64) -> Result<Self, ThresholdError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ThresholdError::OutOfRange(ratio));
        }
        Ok(Self(ratio))
    }

    #[must_use]
    pub fn ratio(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_passed(self, result: &QuizResult) -> bool {
        result.ratio() >= self.0
    }
}

impl Default for PassingThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ThresholdError {
    #[error("passing threshold must be between 0.0 and 1.0, got {0}")]
    OutOfRange(f64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoreError {
    #[error("a quiz needs at least one question")]
    EmptyQuiz,

    #[error("score {score} exceeds total {total}")]
    ScoreExceedsTotal { score: u32, total: u32 },
}

/// Final tally of a completed quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    category: Category,
    score: u32,
    total: u32,
}

impl QuizResult {
    /// # Errors
    ///
    /// Returns `ScoreError` if `total` is zero or `score > total`.
    pub fn new(category: Category, score: u32, total: u32) -> Result<Self, ScoreError> {
        if total == 0 {
            return Err(ScoreError::EmptyQuiz);
        }
        if score > total {
            return Err(ScoreError::ScoreExceedsTotal { score, total });
        }
        Ok(Self {
            category,
            score,
            total,
        })
    }

    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.score) / f64::from(self.total)
    }
}

/// A user's verification record: the categories whose quiz they passed.
///
/// Categories only ever accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCategorySet {
    user_id: UserId,
    display_name: Option<String>,
    categories: BTreeSet<Category>,
    last_updated: Option<DateTime<Utc>>,
}

impl VerifiedCategorySet {
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
            categories: BTreeSet::new(),
            last_updated: None,
        }
    }

    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        display_name: Option<String>,
        categories: impl IntoIterator<Item = Category>,
        last_updated: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            display_name,
            categories: categories.into_iter().collect(),
            last_updated,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    #[must_use]
    pub fn contains(&self, category: &Category) -> bool {
        self.categories.contains(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Union `added` into the set and stamp the merge time.
    ///
    /// A `None` or blank display name leaves the stored one untouched.
    /// Returns `true` if at least one category was new.
    pub fn merge(
        &mut self,
        display_name: Option<&str>,
        added: impl IntoIterator<Item = Category>,
        at: DateTime<Utc>,
    ) -> bool {
        if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
            self.display_name = Some(name.to_string());
        }
        let before = self.categories.len();
        self.categories.extend(added);
        self.last_updated = Some(at);
        self.categories.len() != before
    }
}
