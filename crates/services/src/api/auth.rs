use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ApiError;

/// Bearer credentials for the backend API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access: String,
    pub refresh: String,
}

/// Exchanges a refresh token for a fresh access token.
///
/// Implementations map a rejected refresh (HTTP 401) to
/// [`ApiError::SessionExpired`]; any other failure is an ordinary request
/// error and leaves stored credentials untouched.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError::SessionExpired` when the refresh token itself is
    /// rejected, or a transport error otherwise.
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<String, ApiError>;
}

/// Shared token state with a single-flight refresh gate.
///
/// Any number of requests may observe a 401 concurrently; the `gate` mutex
/// (FIFO under tokio) ensures exactly one of them performs the refresh while
/// the rest queue behind it and reuse the replacement token.
pub struct TokenManager {
    tokens: RwLock<Option<AuthTokens>>,
    gate: Mutex<()>,
}

impl TokenManager {
    #[must_use]
    pub fn new(initial: Option<AuthTokens>) -> Self {
        Self {
            tokens: RwLock::new(initial),
            gate: Mutex::new(()),
        }
    }

    /// Current access token, if credentials are stored.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|t| t.access.clone()))
    }

    /// Current refresh token, if credentials are stored.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|t| t.refresh.clone()))
    }

    /// Replace the stored credentials.
    pub fn set_tokens(&self, tokens: AuthTokens) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = Some(tokens);
        }
    }

    /// Drop stored credentials (the session is over).
    pub fn clear(&self) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = None;
        }
    }

    fn replace_access(&self, access: String) {
        if let Ok(mut guard) = self.tokens.write() {
            if let Some(tokens) = guard.as_mut() {
                tokens.access = access;
            }
        }
    }

    /// Obtain a usable access token after a request saw 401 with
    /// `stale_access`.
    ///
    /// At most one refresh is in flight at a time. Callers that queued behind
    /// an already-running refresh get the replacement token without issuing
    /// another refresh. A refresh rejected by the server clears stored
    /// credentials so every queued caller fails with `SessionExpired`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::SessionExpired` when credentials are gone or the
    /// refresh is rejected; transport errors pass through unchanged.
    pub async fn refresh_after_unauthorized<R: TokenRefresher + ?Sized>(
        &self,
        refresher: &R,
        stale_access: &str,
    ) -> Result<String, ApiError> {
        let _held = self.gate.lock().await;

        // A refresh that completed while we queued already replaced the token.
        match self.access_token() {
            Some(current) if current != stale_access => return Ok(current),
            Some(_) => {}
            None => return Err(ApiError::SessionExpired),
        }

        let refresh_token = self.refresh_token().ok_or(ApiError::SessionExpired)?;
        match refresher.exchange_refresh_token(&refresh_token).await {
            Ok(access) => {
                self.replace_access(access.clone());
                Ok(access)
            }
            Err(ApiError::SessionExpired) => {
                tracing::info!("refresh token rejected, clearing credentials");
                self.clear();
                Err(ApiError::SessionExpired)
            }
            Err(err) => Err(err),
        }
    }
}
