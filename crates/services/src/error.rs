//! Shared error types for the services crate.

use thiserror::Error;

/// Errors emitted by the HTTP API client.
///
/// `SessionExpired` is deliberately distinct from ordinary request failures:
/// it means stored credentials are gone and the host application must force a
/// re-login instead of retrying.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("session expired, re-authentication required")]
    SessionExpired,

    #[error("resource not found")]
    NotFound,

    #[error("request failed with status {0}")]
    Status(reqwest::StatusCode),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors that abort session startup.
///
/// Only the quiz fetch is load-bearing; settings and progress failures
/// degrade silently to defaults or the local cache instead of surfacing here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionLoadError {
    #[error("quiz could not be loaded")]
    QuizUnavailable(#[source] ApiError),

    #[error("quiz has no questions")]
    EmptyQuiz,

    #[error("session expired, re-authentication required")]
    SessionExpired,
}
