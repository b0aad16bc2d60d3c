use std::sync::Arc;
use std::time::Duration;

use crosspoint_core::Clock;
use crosspoint_core::model::{Question, UserId, VerifiedCategorySet};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::live::Listeners;
use crate::namespace::Namespace;
use crate::repository::{QuestionRepository, Storage, VerificationRepository};

mod mapping;
mod migrate;
mod question_repo;
mod verification_repo;

/// SQLite-backed document store, scoped to one namespace.
///
/// Live listeners are held in-process; every successful write through this
/// repository re-delivers fresh snapshots to them.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    namespace: Namespace,
    clock: Clock,
    feed_listeners: Listeners<usize, Vec<Question>>,
    verification_listeners: Listeners<UserId, Option<VerifiedCategorySet>>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or
    /// the connection pragmas fail.
    pub async fn connect(database_url: &str, namespace: Namespace) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        tracing::debug!(%namespace, "sqlite store connected");
        Ok(Self {
            pool,
            namespace,
            clock: Clock::system(),
            feed_listeners: Listeners::new(),
            verification_listeners: Listeners::new(),
        })
    }

    /// Use `clock` for store-assigned timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Same database, different namespace. Listeners are not shared.
    #[must_use]
    pub fn scoped(&self, namespace: Namespace) -> Self {
        Self {
            pool: self.pool.clone(),
            namespace,
            clock: self.clock,
            feed_listeners: Listeners::new(),
            verification_listeners: Listeners::new(),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(
        database_url: &str,
        namespace: Namespace,
        clock: Clock,
    ) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url, namespace)
            .await?
            .with_clock(clock);
        repo.migrate().await?;
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo.clone());
        let verifications: Arc<dyn VerificationRepository> = Arc::new(repo);
        Ok(Self {
            questions,
            verifications,
        })
    }
}
