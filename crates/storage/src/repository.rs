use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use quiz_core::model::{QuizId, SessionProgress};

/// Errors surfaced by the local cache adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Local durable cache for session progress snapshots, keyed by quiz id.
///
/// This is the offline/fallback source; the remote API copy is reconciled
/// against it by the progress store, not here.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the cached snapshot for a quiz, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read or decoded.
    async fn load_progress(&self, quiz_id: QuizId) -> Result<Option<SessionProgress>, StorageError>;

    /// Persist or replace the cached snapshot for a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_progress(
        &self,
        quiz_id: QuizId,
        progress: &SessionProgress,
    ) -> Result<(), StorageError>;

    /// Drop the cached snapshot for a quiz. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete cannot be executed.
    async fn delete_progress(&self, quiz_id: QuizId) -> Result<(), StorageError>;
}

/// Local cache of the last-seen content version per quiz id.
///
/// A mismatch against the server-reported version means the quiz content
/// changed since the last visit; that is surfaced as a notice upstream.
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Last content version observed for a quiz, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be read.
    async fn last_seen_version(&self, quiz_id: QuizId) -> Result<Option<i64>, StorageError>;

    /// Record the version just observed for a quiz.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the version cannot be stored.
    async fn record_version(&self, quiz_id: QuizId, version: i64) -> Result<(), StorageError>;
}

/// Simple in-memory cache implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    progress: Arc<Mutex<HashMap<QuizId, SessionProgress>>>,
    versions: Arc<Mutex<HashMap<QuizId, i64>>>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryCache {
    async fn load_progress(&self, quiz_id: QuizId) -> Result<Option<SessionProgress>, StorageError> {
        let map = self
            .progress
            .lock()
            .map_err(|_| StorageError::Connection("progress lock poisoned".into()))?;
        Ok(map.get(&quiz_id).cloned())
    }

    async fn save_progress(
        &self,
        quiz_id: QuizId,
        progress: &SessionProgress,
    ) -> Result<(), StorageError> {
        let mut map = self
            .progress
            .lock()
            .map_err(|_| StorageError::Connection("progress lock poisoned".into()))?;
        map.insert(quiz_id, progress.clone());
        Ok(())
    }

    async fn delete_progress(&self, quiz_id: QuizId) -> Result<(), StorageError> {
        let mut map = self
            .progress
            .lock()
            .map_err(|_| StorageError::Connection("progress lock poisoned".into()))?;
        map.remove(&quiz_id);
        Ok(())
    }
}

#[async_trait]
impl VersionRepository for InMemoryCache {
    async fn last_seen_version(&self, quiz_id: QuizId) -> Result<Option<i64>, StorageError> {
        let map = self
            .versions
            .lock()
            .map_err(|_| StorageError::Connection("version lock poisoned".into()))?;
        Ok(map.get(&quiz_id).copied())
    }

    async fn record_version(&self, quiz_id: QuizId, version: i64) -> Result<(), StorageError> {
        let mut map = self
            .versions
            .lock()
            .map_err(|_| StorageError::Connection("version lock poisoned".into()))?;
        map.insert(quiz_id, version);
        Ok(())
    }
}
