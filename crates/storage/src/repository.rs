use async_trait::async_trait;
use crosspoint_core::Clock;
use crosspoint_core::model::{
    Category, Question, QuestionId, QuestionStatus, UserId, VerifiedCategorySet, arrange_feed,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::live::{Listener, Listeners, Subscription};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Shape written when posting a question. The store assigns `id` and the
/// authoritative `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestionRecord {
    pub title: String,
    pub body: String,
    pub author_id: UserId,
    pub category: Category,
    pub status: QuestionStatus,
    pub created_at_ms: i64,
}

/// Partial verification record merged into a user's document.
///
/// Fields left `None` are not touched; categories are unioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPatch {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub add_categories: Vec<Category>,
}

/// Repository contract for the shared question collection.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Append a question and notify live subscribers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn insert_question(&self, question: NewQuestionRecord)
    -> Result<QuestionId, StorageError>;

    /// The `limit` most recent questions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be read.
    async fn recent_questions(&self, limit: usize) -> Result<Vec<Question>, StorageError>;

    /// Watch the `limit` most recent questions.
    ///
    /// The current snapshot is delivered before this returns, then a full
    /// replacement snapshot after every write. Attach failures go to the
    /// listener's error callback.
    async fn subscribe_recent(&self, limit: usize, listener: Listener<Vec<Question>>)
    -> Subscription;
}

/// Repository contract for per-user verification documents.
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read.
    async fn get_verification(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, StorageError>;

    /// Merge a partial record into the user's document, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the merge cannot be written.
    async fn merge_verification(
        &self,
        patch: VerificationPatch,
    ) -> Result<VerifiedCategorySet, StorageError>;

    /// Watch one user's document. `None` is delivered while it does not exist.
    async fn subscribe_verification(
        &self,
        user_id: &UserId,
        listener: Listener<Option<VerifiedCategorySet>>,
    ) -> Subscription;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Timestamps come from the repository's own clock, the way a hosted store
/// stamps writes server-side.
#[derive(Clone)]
pub struct InMemoryRepository {
    clock: Clock,
    questions: Arc<Mutex<Vec<Question>>>,
    next_question_id: Arc<Mutex<u64>>,
    verifications: Arc<Mutex<HashMap<UserId, VerifiedCategorySet>>>,
    feed_listeners: Listeners<usize, Vec<Question>>,
    verification_listeners: Listeners<UserId, Option<VerifiedCategorySet>>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::system())
    }

    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            questions: Arc::new(Mutex::new(Vec::new())),
            next_question_id: Arc::new(Mutex::new(1)),
            verifications: Arc::new(Mutex::new(HashMap::new())),
            feed_listeners: Listeners::new(),
            verification_listeners: Listeners::new(),
        }
    }

    /// Number of live subscriptions across both collections.
    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.feed_listeners.len() + self.verification_listeners.len()
    }

    fn snapshot(&self, limit: usize) -> Vec<Question> {
        let mut snapshot = guard(&self.questions).clone();
        arrange_feed(&mut snapshot, limit);
        snapshot
    }

    fn notify_feed(&self) {
        for (limit, listener) in self.feed_listeners.all() {
            listener.deliver(self.snapshot(limit));
        }
    }

    fn notify_verification(&self, user_id: &UserId) {
        let current = guard(&self.verifications).get(user_id).cloned();
        for listener in self.verification_listeners.for_key(user_id) {
            listener.deliver(current.clone());
        }
    }
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let id = {
            let mut next = guard(&self.next_question_id);
            let id = QuestionId::new(*next);
            *next += 1;
            id
        };
        let stored = Question::from_persisted(
            id,
            question.title,
            question.body,
            question.author_id,
            question.category,
            question.status,
            Some(self.clock.now()),
            question.created_at_ms,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard(&self.questions).push(stored);

        self.notify_feed();
        Ok(id)
    }

    async fn recent_questions(&self, limit: usize) -> Result<Vec<Question>, StorageError> {
        Ok(self.snapshot(limit))
    }

    async fn subscribe_recent(
        &self,
        limit: usize,
        listener: Listener<Vec<Question>>,
    ) -> Subscription {
        let (listener, subscription) = self.feed_listeners.register(limit, listener);
        listener.deliver(self.snapshot(limit));
        subscription
    }
}

#[async_trait]
impl VerificationRepository for InMemoryRepository {
    async fn get_verification(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, StorageError> {
        Ok(guard(&self.verifications).get(user_id).cloned())
    }

    async fn merge_verification(
        &self,
        patch: VerificationPatch,
    ) -> Result<VerifiedCategorySet, StorageError> {
        let merged = {
            let mut docs = guard(&self.verifications);
            let doc = docs
                .entry(patch.user_id.clone())
                .or_insert_with(|| VerifiedCategorySet::empty(patch.user_id.clone()));
            doc.merge(
                patch.display_name.as_deref(),
                patch.add_categories,
                self.clock.now(),
            );
            doc.clone()
        };

        self.notify_verification(&patch.user_id);
        Ok(merged)
    }

    async fn subscribe_verification(
        &self,
        user_id: &UserId,
        listener: Listener<Option<VerifiedCategorySet>>,
    ) -> Subscription {
        let (listener, subscription) = self
            .verification_listeners
            .register(user_id.clone(), listener);
        let current = guard(&self.verifications).get(user_id).cloned();
        listener.deliver(current);
        subscription
    }
}

/// Aggregates repositories for dependency wiring.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub verifications: Arc<dyn VerificationRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        let repo = InMemoryRepository::with_clock(clock);
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo.clone());
        let verifications: Arc<dyn VerificationRepository> = Arc::new(repo);
        Self {
            questions,
            verifications,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosspoint_core::time::{fixed_clock, fixed_now};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(title: &str) -> NewQuestionRecord {
        NewQuestionRecord {
            title: title.to_string(),
            body: "Body".to_string(),
            author_id: UserId::new("author").unwrap(),
            category: Category::general(),
            status: QuestionStatus::Open,
            created_at_ms: fixed_now().timestamp_millis(),
        }
    }

    fn cat(name: &str) -> Category {
        Category::new(name).unwrap()
    }

    #[tokio::test]
    async fn feed_is_newest_first_and_bounded() {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        for i in 1..=3 {
            repo.insert_question(record(&format!("t{i}"))).await.unwrap();
        }
        let feed = repo.recent_questions(2).await.unwrap();
        let titles: Vec<&str> = feed.iter().map(Question::title).collect();
        assert_eq!(titles, vec!["t3", "t2"]);
    }

    #[tokio::test]
    async fn subscription_receives_snapshot_then_replacements() {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        repo.insert_question(record("first")).await.unwrap();

        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = repo
            .subscribe_recent(
                50,
                Listener::updates_only(move |qs: Vec<Question>| {
                    sink.lock().unwrap().push(qs.len());
                }),
            )
            .await;
        repo.insert_question(record("second")).await.unwrap();
        drop(sub);
        repo.insert_question(record("third")).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(repo.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn merge_creates_then_unions() {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        let user = UserId::new("u1").unwrap();
        assert!(repo.get_verification(&user).await.unwrap().is_none());

        repo.merge_verification(VerificationPatch {
            user_id: user.clone(),
            display_name: Some("Ada".into()),
            add_categories: vec![cat("Physics")],
        })
        .await
        .unwrap();
        let merged = repo
            .merge_verification(VerificationPatch {
                user_id: user.clone(),
                display_name: None,
                add_categories: vec![cat("Physics"), cat("Biology")],
            })
            .await
            .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.display_name(), Some("Ada"));
        assert_eq!(repo.get_verification(&user).await.unwrap(), Some(merged));
    }

    #[tokio::test]
    async fn verification_subscription_is_per_user() {
        let repo = InMemoryRepository::with_clock(fixed_clock());
        let me = UserId::new("me").unwrap();
        let other = UserId::new("other").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = repo
            .subscribe_verification(
                &me,
                Listener::updates_only(move |_: Option<VerifiedCategorySet>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;

        repo.merge_verification(VerificationPatch {
            user_id: other,
            display_name: None,
            add_categories: vec![cat("Physics")],
        })
        .await
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
