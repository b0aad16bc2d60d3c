use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::model::{Category, QuestionId, UserId};
use crate::quiz_bank::QuizBank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Open,
    Closed,
}

impl QuestionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStatus::Open => "open",
            QuestionStatus::Closed => "closed",
        }
    }

    /// Parse the persisted representation.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidStatus` for unknown values.
    pub fn parse(raw: &str) -> Result<Self, QuestionError> {
        match raw {
            "open" => Ok(QuestionStatus::Open),
            "closed" => Ok(QuestionStatus::Closed),
            other => Err(QuestionError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question title cannot be empty")]
    EmptyTitle,

    #[error("question body cannot be empty")]
    EmptyBody,

    #[error("question category cannot be empty")]
    EmptyCategory,

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("invalid question status: {0}")]
    InvalidStatus(String),
}

/// A posted question as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    title: String,
    body: String,
    author_id: UserId,
    category: Category,
    status: QuestionStatus,
    created_at: Option<DateTime<Utc>>,
    created_at_ms: i64,
}

impl Question {
    /// Rehydrate a question from persisted storage.
    ///
    /// `created_at` is the store-assigned timestamp and may be absent while the
    /// write is still settling; `created_at_ms` is the client-observed fallback.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if title or body are blank.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: QuestionId,
        title: impl Into<String>,
        body: impl Into<String>,
        author_id: UserId,
        category: Category,
        status: QuestionStatus,
        created_at: Option<DateTime<Utc>>,
        created_at_ms: i64,
    ) -> Result<Self, QuestionError> {
        let title = title.into();
        let body = body.into();
        if title.trim().is_empty() {
            return Err(QuestionError::EmptyTitle);
        }
        if body.trim().is_empty() {
            return Err(QuestionError::EmptyBody);
        }
        Ok(Self {
            id,
            title,
            body,
            author_id,
            category,
            status,
            created_at,
            created_at_ms,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn author_id(&self) -> &UserId {
        &self.author_id
    }

    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    #[must_use]
    pub fn status(&self) -> QuestionStatus {
        self.status
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    #[must_use]
    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    /// Timestamp used for feed ordering: the store timestamp once resolved,
    /// the client fallback before that.
    #[must_use]
    pub fn ordering_millis(&self) -> i64 {
        self.created_at
            .map_or(self.created_at_ms, |at| at.timestamp_millis())
    }

    /// Feed order: newest first, later ids first on equal timestamps.
    #[must_use]
    pub fn feed_order(a: &Question, b: &Question) -> Ordering {
        b.ordering_millis()
            .cmp(&a.ordering_millis())
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// Arrange questions in feed order and keep the `limit` most recent.
pub fn arrange_feed(questions: &mut Vec<Question>, limit: usize) {
    questions.sort_by(Question::feed_order);
    questions.truncate(limit);
}

/// User input for a new question, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionDraft {
    pub title: String,
    pub body: String,
    pub category: String,
}

/// A validated question ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub title: String,
    pub body: String,
    pub category: Category,
}

impl QuestionDraft {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            category: category.into(),
        }
    }

    /// Validate the draft against the set of postable categories.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for a blank title/body/category, or a category
    /// that is neither in the quiz bank nor "General".
    pub fn validate(&self, bank: &QuizBank) -> Result<NewQuestion, QuestionError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(QuestionError::EmptyTitle);
        }
        let body = self.body.trim();
        if body.is_empty() {
            return Err(QuestionError::EmptyBody);
        }
        let category =
            Category::new(self.category.as_str()).map_err(|_| QuestionError::EmptyCategory)?;
        if !bank.is_postable(&category) {
            return Err(QuestionError::UnknownCategory(category.to_string()));
        }
        Ok(NewQuestion {
            title: title.to_string(),
            body: body.to_string(),
            category,
        })
    }
}
