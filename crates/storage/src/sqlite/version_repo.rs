use async_trait::async_trait;
use sqlx::Row;

use quiz_core::model::QuizId;

use super::SqliteCache;
use crate::repository::{StorageError, VersionRepository};

#[async_trait]
impl VersionRepository for SqliteCache {
    async fn last_seen_version(&self, quiz_id: QuizId) -> Result<Option<i64>, StorageError> {
        let row = sqlx::query("SELECT version FROM quiz_versions WHERE quiz_id = ?1")
            .bind(quiz_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        row.try_get("version")
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    async fn record_version(&self, quiz_id: QuizId, version: i64) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO quiz_versions (quiz_id, version)
            VALUES (?1, ?2)
            ON CONFLICT(quiz_id) DO UPDATE SET version = excluded.version
            ",
        )
        .bind(quiz_id.to_string())
        .bind(version)
        .execute(self.pool())
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
