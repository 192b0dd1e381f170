use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};

use quiz_core::model::{QuizId, SessionProgress, StudySettings};
use quiz_core::reoccurrence::ReoccurrenceEntry;
use quiz_core::{Quiz, QuestionId};

use super::auth::{TokenManager, TokenRefresher};
use crate::error::ApiError;

/// The backend contract the session engine consumes.
///
/// The server is an opaque collaborator; this trait is the whole surface the
/// engine relies on, which also makes it the seam for test fakes.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` when the quiz cannot be fetched or decoded.
    async fn fetch_quiz(&self, quiz_id: QuizId) -> Result<Quiz, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` when the settings request fails.
    async fn fetch_settings(&self) -> Result<StudySettings, ApiError>;

    /// Remote progress for a quiz; `Ok(None)` when the server has none.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport or decode failures.
    async fn fetch_progress(&self, quiz_id: QuizId) -> Result<Option<SessionProgress>, ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` when the snapshot cannot be stored remotely.
    async fn save_progress(
        &self,
        quiz_id: QuizId,
        progress: &SessionProgress,
    ) -> Result<(), ApiError>;

    /// # Errors
    ///
    /// Returns `ApiError` when the remote delete fails.
    async fn delete_progress(&self, quiz_id: QuizId) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

/// Bearer-authenticated `reqwest` client for the quiz backend.
///
/// Every request attaches the current access token; a 401 triggers exactly
/// one transparent refresh-and-retry through the shared [`TokenManager`].
pub struct ApiClient {
    http: Client,
    config: ApiConfig,
    tokens: Arc<TokenManager>,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: ApiConfig, tokens: Arc<TokenManager>) -> Self {
        Self {
            http: Client::new(),
            config,
            tokens,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send a request, refreshing the access token at most once on 401.
    async fn send_with_auth(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, ApiError> {
        let token = self.tokens.access_token();
        let response = self
            .send_once(method.clone(), path, body.as_ref(), token.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check_status(response);
        }

        let Some(stale) = token else {
            return Err(ApiError::SessionExpired);
        };
        let fresh = self
            .tokens
            .refresh_after_unauthorized(self, &stale)
            .await?;
        let retried = self
            .send_once(method, path, body.as_ref(), Some(&fresh))
            .await?;
        Self::check_status(retried)
    }

    fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send_with_auth(Method::GET, path, None).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(self.url("/token/refresh/"))
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::SessionExpired);
        }
        let response = Self::check_status(response)?;
        let body: RefreshResponse = response.json().await?;
        Ok(body.access)
    }
}

#[async_trait]
impl QuizBackend for ApiClient {
    async fn fetch_quiz(&self, quiz_id: QuizId) -> Result<Quiz, ApiError> {
        self.get_json(&format!("/quizzes/{quiz_id}/")).await
    }

    async fn fetch_settings(&self) -> Result<StudySettings, ApiError> {
        self.get_json("/settings/").await
    }

    async fn fetch_progress(&self, quiz_id: QuizId) -> Result<Option<SessionProgress>, ApiError> {
        match self
            .get_json::<ProgressDto>(&format!("/quiz-progress/{quiz_id}/"))
            .await
        {
            Ok(dto) => Ok(Some(dto.into_progress())),
            Err(ApiError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save_progress(
        &self,
        quiz_id: QuizId,
        progress: &SessionProgress,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_value(ProgressDto::from_progress(progress))
            .map_err(|_| ApiError::Status(StatusCode::UNPROCESSABLE_ENTITY))?;
        self.send_with_auth(
            Method::POST,
            &format!("/quiz-progress/{quiz_id}/"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn delete_progress(&self, quiz_id: QuizId) -> Result<(), ApiError> {
        self.send_with_auth(Method::DELETE, &format!("/quiz-progress/{quiz_id}/"), None)
            .await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

/// Wire shape of a progress snapshot.
///
/// The server encodes "no current question" as id `0`; the engine models it
/// as `None`, so the mapping lives here at the boundary.
#[derive(Debug, Serialize, Deserialize)]
struct ProgressDto {
    current_question: u64,
    correct_answers_count: u32,
    wrong_answers_count: u32,
    study_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    reoccurrences: Vec<ReoccurrenceEntry>,
}

impl ProgressDto {
    fn from_progress(progress: &SessionProgress) -> Self {
        Self {
            current_question: progress
                .current_question
                .map_or(0, |id| id.value()),
            correct_answers_count: progress.correct_count,
            wrong_answers_count: progress.wrong_count,
            study_time: progress.study_time_seconds,
            last_activity: progress.last_activity,
            reoccurrences: progress.reoccurrences.clone(),
        }
    }

    fn into_progress(self) -> SessionProgress {
        SessionProgress {
            current_question: (self.current_question != 0)
                .then(|| QuestionId::new(self.current_question)),
            correct_count: self.correct_answers_count,
            wrong_count: self.wrong_answers_count,
            study_time_seconds: self.study_time,
            reoccurrences: self.reoccurrences,
            last_activity: self.last_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_dto_zero_means_no_current_question() {
        let dto: ProgressDto = serde_json::from_str(
            r#"{
                "current_question": 0,
                "correct_answers_count": 2,
                "wrong_answers_count": 1,
                "study_time": 30
            }"#,
        )
        .unwrap();

        let progress = dto.into_progress();
        assert_eq!(progress.current_question, None);
        assert_eq!(progress.correct_count, 2);
        assert!(progress.reoccurrences.is_empty());
    }

    #[test]
    fn progress_dto_roundtrip() {
        let progress = SessionProgress {
            current_question: Some(QuestionId::new(4)),
            correct_count: 1,
            wrong_count: 2,
            study_time_seconds: 60,
            reoccurrences: vec![ReoccurrenceEntry::new(QuestionId::new(4), 3)],
            last_activity: None,
        };

        let dto = ProgressDto::from_progress(&progress);
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["current_question"], 4);
        assert_eq!(json["reoccurrences"][0]["id"], 4);
        assert_eq!(json["reoccurrences"][0]["reoccurrences"], 3);

        let back: ProgressDto = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_progress(), progress);
    }
}
