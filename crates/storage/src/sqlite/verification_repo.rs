use crosspoint_core::model::{UserId, VerifiedCategorySet};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{category_from_row, conn, ser};
use crate::live::{Listener, Subscription};
use crate::repository::{StorageError, VerificationPatch, VerificationRepository};

impl SqliteRepository {
    async fn fetch_verification(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, StorageError> {
        let profile = sqlx::query(
            r"
            SELECT display_name, last_updated
            FROM verification_profiles
            WHERE namespace = ?1 AND user_id = ?2
            ",
        )
        .bind(self.namespace.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(profile) = profile else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r"
            SELECT category
            FROM verified_categories
            WHERE namespace = ?1 AND user_id = ?2
            ORDER BY category ASC
            ",
        )
        .bind(self.namespace.as_str())
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in &rows {
            categories.push(category_from_row(row, "category")?);
        }

        Ok(Some(VerifiedCategorySet::from_persisted(
            user_id.clone(),
            profile
                .try_get::<Option<String>, _>("display_name")
                .map_err(ser)?,
            categories,
            profile.try_get("last_updated").map_err(ser)?,
        )))
    }

    async fn notify_verification(&self, user_id: &UserId) {
        let listeners = self.verification_listeners.for_key(user_id);
        if listeners.is_empty() {
            return;
        }
        match self.fetch_verification(user_id).await {
            Ok(current) => {
                for listener in listeners {
                    listener.deliver(current.clone());
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, user_id = %user_id, "failed to refresh verification record");
                for listener in listeners {
                    listener.fail(&err);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl VerificationRepository for SqliteRepository {
    async fn get_verification(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerifiedCategorySet>, StorageError> {
        self.fetch_verification(user_id).await
    }

    async fn merge_verification(
        &self,
        patch: VerificationPatch,
    ) -> Result<VerifiedCategorySet, StorageError> {
        let now = self.clock.now();
        let display_name = patch
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO verification_profiles (namespace, user_id, display_name, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(namespace, user_id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, verification_profiles.display_name),
                last_updated = excluded.last_updated
            ",
        )
        .bind(self.namespace.as_str())
        .bind(patch.user_id.as_str())
        .bind(display_name)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for category in &patch.add_categories {
            sqlx::query(
                r"
                INSERT INTO verified_categories (namespace, user_id, category)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(namespace, user_id, category) DO NOTHING
                ",
            )
            .bind(self.namespace.as_str())
            .bind(patch.user_id.as_str())
            .bind(category.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(
            path = %self.namespace.profile_path(patch.user_id.as_str()),
            added = patch.add_categories.len(),
            "verification merged"
        );

        let merged = self
            .fetch_verification(&patch.user_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        self.notify_verification(&patch.user_id).await;
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
        match self.fetch_verification(user_id).await {
            Ok(current) => listener.deliver(current),
            Err(err) => {
                tracing::warn!(error = %err, "verification record failed to attach");
                listener.fail(&err);
            }
        }
        subscription
    }
}
