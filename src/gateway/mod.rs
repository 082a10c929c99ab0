//! OpenAI-compatible HTTP surface.
//!
//! Grounded on `api/chat.go`'s route set (`/v1/models`, `/v1/chat/
//! completions`) and on this crate's original axum handler/state shape,
//! bearer-auth gate, and SSE chunk construction idiom that the real
//! per-token streaming in `chat.rs` reuses.

mod chat;
mod models;

pub use chat::chat_completions;
pub use models::list_models;

use crate::error::AppError;
use crate::orchestrator::Orchestrator;
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub api_keys: Arc<Vec<String>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/v1/models", get(models::list_models))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .with_state(state)
}

async fn root() -> &'static str {
    "aichat-proxy"
}

/// Bearer-token gate. When no keys are configured the gateway is open,
/// matching the original's local-use-first posture.
pub fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    authorize_keys(&state.api_keys, headers)
}

fn authorize_keys(api_keys: &[String], headers: &HeaderMap) -> Result<(), AppError> {
    if api_keys.is_empty() {
        return Ok(());
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if api_keys.iter().any(|key| key == token) {
        Ok(())
    } else {
        Err(AppError::unauthorized("missing or invalid API key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_gateway_allows_any_request() {
        assert!(authorize_keys(&[], &HeaderMap::new()).is_ok());
    }

    #[test]
    fn rejects_missing_bearer_token() {
        let keys = vec!["secret".to_string()];
        assert!(authorize_keys(&keys, &HeaderMap::new()).is_err());
    }

    #[test]
    fn accepts_matching_bearer_token() {
        let keys = vec!["secret".to_string()];
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(authorize_keys(&keys, &headers).is_ok());
    }
}
