//! Render model produced by `SessionController::render`.

use crosspoint_core::model::{Category, Identity, Question, QuestionId, QuestionStatus, UserId};

/// What the UI should show, in precedence order: loading, then a fatal error,
/// then the selected view.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Loading,
    Fatal { message: String },
    Feed(FeedScreen),
    Post(PostScreen),
    Quiz(QuizScreen),
}

/// A non-fatal error shown above the current view until dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub id: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCard {
    pub id: QuestionId,
    pub title: String,
    pub body: String,
    pub category: Category,
    pub author_id: UserId,
    pub status: QuestionStatus,
    /// Feed sort key: the store timestamp once resolved, else the client one.
    pub ordered_at_ms: i64,
    pub can_answer: bool,
    pub mine: bool,
}

impl FeedCard {
    pub(crate) fn new(question: &Question, viewer: &Identity, can_answer: bool) -> Self {
        Self {
            id: question.id(),
            title: question.title().to_string(),
            body: question.body().to_string(),
            category: question.category().clone(),
            author_id: question.author_id().clone(),
            status: question.status(),
            ordered_at_ms: question.ordering_millis(),
            can_answer,
            mine: question.author_id() == viewer.user_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedScreen {
    pub user: Identity,
    pub cards: Vec<FeedCard>,
    pub verified: Vec<Category>,
    pub quiz_categories: Vec<Category>,
    pub banners: Vec<Banner>,
    /// Outcome of the most recent quiz.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostScreen {
    pub user: Identity,
    pub categories: Vec<Category>,
    pub posting: bool,
    pub error: Option<String>,
    pub banners: Vec<Banner>,
}

/// Correct answer for the question on screen, once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealView {
    pub answer: String,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizScreen {
    pub category: Category,
    /// 0-based position of the question on screen.
    pub index: usize,
    pub total: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub selected: Option<String>,
    pub score: u32,
    pub revealed: Option<RevealView>,
    /// `false` while the reveal is showing.
    pub input_enabled: bool,
    pub banners: Vec<Banner>,
}
