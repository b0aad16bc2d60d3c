use crosspoint_core::model::{Question, QuestionId};

use super::SqliteRepository;
use super::mapping::{conn, limit_to_i64, map_question_row, question_id_from_i64};
use crate::live::{Listener, Subscription};
use crate::repository::{NewQuestionRecord, QuestionRepository, StorageError};

impl SqliteRepository {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, body, author_id, category, status, created_at, created_at_ms
            FROM questions
            WHERE namespace = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(self.namespace.as_str())
        .bind(limit_to_i64(limit)?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn notify_feed(&self) {
        let listeners = self.feed_listeners.all();
        let Some(widest) = listeners.iter().map(|(limit, _)| *limit).max() else {
            return;
        };
        match self.fetch_recent(widest).await {
            Ok(snapshot) => {
                for (limit, listener) in listeners {
                    listener.deliver(snapshot.iter().take(limit).cloned().collect());
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to refresh question feed");
                for (_, listener) in listeners {
                    listener.fail(&err);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn insert_question(
        &self,
        question: NewQuestionRecord,
    ) -> Result<QuestionId, StorageError> {
        let created_at = self.clock.now();
        let res = sqlx::query(
            r"
            INSERT INTO questions (namespace, title, body, author_id, category, status, created_at, created_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(self.namespace.as_str())
        .bind(question.title)
        .bind(question.body)
        .bind(question.author_id.as_str())
        .bind(question.category.as_str())
        .bind(question.status.as_str())
        .bind(created_at)
        .bind(question.created_at_ms)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = question_id_from_i64(res.last_insert_rowid())?;
        tracing::debug!(
            question_id = %id,
            path = %self.namespace.questions_path(),
            "question stored"
        );
        self.notify_feed().await;
        Ok(id)
    }

    async fn recent_questions(&self, limit: usize) -> Result<Vec<Question>, StorageError> {
        self.fetch_recent(limit).await
    }

    async fn subscribe_recent(
        &self,
        limit: usize,
        listener: Listener<Vec<Question>>,
    ) -> Subscription {
        let (listener, subscription) = self.feed_listeners.register(limit, listener);
        match self.fetch_recent(limit).await {
            Ok(snapshot) => listener.deliver(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "question feed failed to attach");
                listener.fail(&err);
            }
        }
        subscription
    }
}
