use std::sync::Arc;

use crosspoint_core::model::{Identity, Question, QuestionDraft, QuestionId, QuestionStatus};
use crosspoint_core::{Clock, QuizBank};
use storage::{Listener, NewQuestionRecord, QuestionRepository, Subscription};

use crate::config::DEFAULT_FEED_LIMIT;
use crate::error::PostError;

/// Posting to and watching the shared question feed.
#[derive(Clone)]
pub struct FeedService {
    clock: Clock,
    limit: usize,
    bank: Arc<QuizBank>,
    questions: Arc<dyn QuestionRepository>,
}

impl FeedService {
    #[must_use]
    pub fn new(clock: Clock, bank: Arc<QuizBank>, questions: Arc<dyn QuestionRepository>) -> Self {
        Self {
            clock,
            limit: DEFAULT_FEED_LIMIT,
            bank,
            questions,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn bank(&self) -> &QuizBank {
        &self.bank
    }

    /// Validate and publish a question as open.
    ///
    /// Nothing is written when validation fails.
    ///
    /// # Errors
    ///
    /// Returns `PostError::Unauthenticated` without an author,
    /// `PostError::Invalid` for a bad draft, or `PostError::Storage` when the
    /// write fails.
    pub async fn post_question(
        &self,
        author: Option<&Identity>,
        draft: &QuestionDraft,
    ) -> Result<QuestionId, PostError> {
        let author = author.ok_or(PostError::Unauthenticated)?;
        let question = draft.validate(&self.bank)?;
        let id = self
            .questions
            .insert_question(NewQuestionRecord {
                title: question.title,
                body: question.body,
                author_id: author.user_id().clone(),
                category: question.category,
                status: QuestionStatus::Open,
                created_at_ms: self.clock.now_millis(),
            })
            .await
            .inspect_err(|err| tracing::error!(error = %err, "failed to post question"))?;
        tracing::info!(question_id = %id, author = %author.user_id(), "question posted");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `PostError::Storage` if the feed cannot be read.
    pub async fn recent(&self) -> Result<Vec<Question>, PostError> {
        Ok(self.questions.recent_questions(self.limit).await?)
    }

    /// Watch the newest questions, bounded by the configured limit.
    pub async fn subscribe(&self, listener: Listener<Vec<Question>>) -> Subscription {
        self.questions.subscribe_recent(self.limit, listener).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosspoint_core::model::{QuestionError, UserId};
    use crosspoint_core::time::fixed_clock;
    use storage::InMemoryRepository;

    fn service(limit: usize) -> FeedService {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        FeedService::new(fixed_clock(), Arc::new(QuizBank::builtin()), Arc::new(repo))
            .with_limit(limit)
    }

    fn author() -> Identity {
        Identity::new(UserId::new("author-1").unwrap(), None, true)
    }

    #[tokio::test]
    async fn posts_are_open_and_newest_first() {
        let feed = service(2);
        for title in ["one", "two", "three"] {
            feed.post_question(Some(&author()), &QuestionDraft::new(title, "Body", "Physics"))
                .await
                .unwrap();
        }
        let recent = feed.recent().await.unwrap();
        let titles: Vec<&str> = recent.iter().map(Question::title).collect();
        assert_eq!(titles, vec!["three", "two"]);
        assert!(recent.iter().all(|q| q.status() == QuestionStatus::Open));
    }

    #[tokio::test]
    async fn invalid_drafts_write_nothing() {
        let feed = service(50);
        assert_eq!(
            feed.post_question(Some(&author()), &QuestionDraft::new("Title", "  ", "General"))
                .await,
            Err(PostError::Invalid(QuestionError::EmptyBody))
        );
        assert_eq!(
            feed.post_question(Some(&author()), &QuestionDraft::new("Title", "Body", "Poetry"))
                .await,
            Err(PostError::Invalid(QuestionError::UnknownCategory(
                "Poetry".into()
            )))
        );
        assert!(feed.recent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn posting_requires_an_author() {
        let feed = service(50);
        assert_eq!(
            feed.post_question(None, &QuestionDraft::new("Title", "Body", "General"))
                .await,
            Err(PostError::Unauthenticated)
        );
    }
}
