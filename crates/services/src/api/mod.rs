//! HTTP client for the quiz backend, including the token-refresh contract.

mod auth;
mod client;

pub use auth::{AuthTokens, TokenManager, TokenRefresher};
pub use client::{ApiClient, ApiConfig, QuizBackend};
