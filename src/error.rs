//! Crate-wide error type.
//!
//! Every fallible operation in the proxy funnels into [`AppError`], which
//! carries enough structure to render the same JSON error envelope the
//! gateway promises callers: `{status, code, message, metadata}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Unauthorized,
    PageAcquireFailed,
    AdapterFailed,
    StreamTimeout,
    Canceled,
    Internal,
}

impl ErrorKind {
    fn status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::PageAcquireFailed => StatusCode::BAD_GATEWAY,
            ErrorKind::AdapterFailed => StatusCode::BAD_GATEWAY,
            ErrorKind::StreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Canceled => StatusCode::from_u16(499).unwrap(),
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::PageAcquireFailed => "page_acquire_failed",
            ErrorKind::AdapterFailed => "adapter_failed",
            ErrorKind::StreamTimeout => "stream_timeout",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), metadata: BTreeMap::new() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn page_acquire_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PageAcquireFailed, message)
    }

    pub fn adapter_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AdapterFailed, message)
    }

    pub fn stream_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StreamTimeout, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<fantoccini::error::CmdError> for AppError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        AppError::adapter_failed(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: &'a BTreeMap<String, String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        tracing::warn!(code = self.kind.code(), message = %self.message, "request failed");
        let body = ErrorBody {
            status: status.as_u16(),
            code: self.kind.code(),
            message: &self.message,
            metadata: &self.metadata,
        };
        (status, Json(serde_json::json!({ "error": body }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::not_found("model not found: gpt-5");
        assert_eq!(err.kind.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind.code(), "not_found");
    }

    #[test]
    fn metadata_builder_accumulates() {
        let err = AppError::adapter_failed("timed out")
            .with_metadata("vendor", "doubao")
            .with_metadata("session", "abc");
        assert_eq!(err.metadata.get("vendor").map(String::as_str), Some("doubao"));
        assert_eq!(err.metadata.len(), 2);
    }

    #[test]
    fn canceled_uses_nonstandard_499() {
        let err = AppError::canceled("client disconnected");
        assert_eq!(err.kind.status().as_u16(), 499);
    }
}
