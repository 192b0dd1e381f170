use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use quiz_core::model::{QuizId, SessionProgress};

use super::SqliteCache;
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteCache {
    async fn load_progress(&self, quiz_id: QuizId) -> Result<Option<SessionProgress>, StorageError> {
        let row = sqlx::query("SELECT payload FROM quiz_progress WHERE quiz_id = ?1")
            .bind(quiz_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row
            .try_get("payload")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn save_progress(
        &self,
        quiz_id: QuizId,
        progress: &SessionProgress,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(progress)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO quiz_progress (quiz_id, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(quiz_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
        )
        .bind(quiz_id.to_string())
        .bind(payload)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn delete_progress(&self, quiz_id: QuizId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM quiz_progress WHERE quiz_id = ?1")
            .bind(quiz_id.to_string())
            .execute(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
