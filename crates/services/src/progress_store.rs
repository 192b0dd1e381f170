use std::sync::Arc;

use quiz_core::model::{QuizId, SessionProgress};
use storage::repository::{ProgressRepository, VersionRepository};

use crate::api::QuizBackend;

/// Outcome of comparing the server-reported quiz version with the last one
/// seen on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// First visit to this quiz on this device.
    FirstSeen,
    Unchanged,
    /// Content changed since last visit; surfaced as a notice, never a reset.
    Changed { previous: i64, current: i64 },
}

/// Reconciles session progress between the local durable cache and the
/// remote API.
///
/// The local cache is the always-written fallback; the remote copy is
/// written only by the continuity leader (or a device with no peers) so
/// followers cannot race the leader on server state. No failure here is ever
/// surfaced to the study session; everything degrades to the other source.
#[derive(Clone)]
pub struct ProgressStore {
    local: Arc<dyn ProgressRepository>,
    versions: Arc<dyn VersionRepository>,
    remote: Arc<dyn QuizBackend>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        local: Arc<dyn ProgressRepository>,
        versions: Arc<dyn VersionRepository>,
        remote: Arc<dyn QuizBackend>,
    ) -> Self {
        Self {
            local,
            versions,
            remote,
        }
    }

    /// Load prior progress: remote first when sync is enabled, silently
    /// falling back to the local cache, then to `None` (fresh session).
    pub async fn load(&self, quiz_id: QuizId, sync_enabled: bool) -> Option<SessionProgress> {
        if sync_enabled {
            match self.remote.fetch_progress(quiz_id).await {
                Ok(Some(progress)) => return Some(progress),
                Ok(None) => {
                    tracing::debug!(%quiz_id, "no remote progress, falling back to local cache");
                }
                Err(err) => {
                    tracing::debug!(%quiz_id, error = %err, "remote progress fetch failed, falling back to local cache");
                }
            }
        }

        match self.local.load_progress(quiz_id).await {
            Ok(progress) => progress,
            Err(err) => {
                tracing::warn!(%quiz_id, error = %err, "local progress cache unreadable");
                None
            }
        }
    }

    /// Persist a snapshot.
    ///
    /// The local write happens unconditionally and never surfaces a failure.
    /// The remote write happens only when sync is enabled and this device is
    /// the write authority (continuity leader, or no active peers).
    pub async fn save(
        &self,
        quiz_id: QuizId,
        progress: &SessionProgress,
        sync_enabled: bool,
        is_authority: bool,
    ) {
        if let Err(err) = self.local.save_progress(quiz_id, progress).await {
            tracing::warn!(%quiz_id, error = %err, "local progress save failed");
        }

        if sync_enabled && is_authority {
            if let Err(err) = self.remote.save_progress(quiz_id, progress).await {
                tracing::warn!(%quiz_id, error = %err, "remote progress save failed");
            }
        }
    }

    /// Clear stored progress. The local reset always succeeds; a failed
    /// remote delete is logged and forgotten.
    pub async fn reset(&self, quiz_id: QuizId, sync_enabled: bool) {
        if let Err(err) = self.local.delete_progress(quiz_id).await {
            tracing::warn!(%quiz_id, error = %err, "local progress delete failed");
        }

        if sync_enabled {
            if let Err(err) = self.remote.delete_progress(quiz_id).await {
                tracing::warn!(%quiz_id, error = %err, "remote progress delete failed");
            }
        }
    }

    /// Compare and record the server-reported content version for a quiz.
    pub async fn observe_version(&self, quiz_id: QuizId, version: i64) -> VersionCheck {
        let previous = match self.versions.last_seen_version(quiz_id).await {
            Ok(previous) => previous,
            Err(err) => {
                tracing::warn!(%quiz_id, error = %err, "version cache unreadable");
                None
            }
        };

        if let Err(err) = self.versions.record_version(quiz_id, version).await {
            tracing::warn!(%quiz_id, error = %err, "version cache write failed");
        }

        match previous {
            None => VersionCheck::FirstSeen,
            Some(previous) if previous == version => VersionCheck::Unchanged,
            Some(previous) => VersionCheck::Changed {
                previous,
                current: version,
            },
        }
    }
}
