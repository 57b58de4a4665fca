//! Presentation layer error types with HTTP response integration.
//!
//! This module defines [`AppError`], the top-level error type used at HTTP
//! boundaries. It unifies the domain crates' error types (`QueueError`,
//! `EventError`, `MappingError`) and implements axum's [`IntoResponse`] for
//! automatic HTTP response generation.
//!
//! # HTTP response format
//!
//! All errors are serialized to JSON with consistent structure:
//!
//! ```json
//! {
//!   "code": "NOT_FOUND",
//!   "message": "operation abc-123 not found",
//!   "errorId": "550e8400-e29b-41d4-a716-446655440000"
//! }
//! ```
//!
//! Internal errors never leak a raw `Display` of a third-party error type
//! (e.g. a `sqlx::Error`) beyond the stable `ErrorCode`; the full error
//! chain (via `source()`) goes to the log line, tagged with `error_id` for
//! correlation, not to the HTTP client.

use std::backtrace::Backtrace;
use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use qaint_core::ErrorCode;
use qaint_events::EventError;
use qaint_mapping::MappingError;
use qaint_queue::QueueError;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// Top-level application error unifying the domain crates' error types with
/// UUID tracking for log correlation.
#[derive(Debug)]
pub struct AppError {
    id: Uuid,
    kind: AppErrorKind,
    backtrace: Backtrace,
}

/// Specific application error kinds.
#[derive(Debug)]
pub enum AppErrorKind {
    Queue(QueueError),
    Event(EventError),
    Mapping(MappingError),
    /// A request body failed to parse into the handler's expected shape.
    BadRequest(String),
}

impl AppError {
    #[must_use]
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::BadRequest(message.into()))
    }

    #[must_use]
    pub fn error_id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> &AppErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Queue(e) => e.error_code(),
            AppErrorKind::Event(e) => e.error_code(),
            AppErrorKind::Mapping(e) => e.error_code(),
            AppErrorKind::BadRequest(_) => ErrorCode::ValidationFailed,
        }
    }

    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        StatusCode::from_u16(self.error_code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
            error_id: self.id,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Queue(e) => write!(f, "{e}"),
            AppErrorKind::Event(e) => write!(f, "{e}"),
            AppErrorKind::Mapping(e) => write!(f, "{e}"),
            AppErrorKind::BadRequest(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AppErrorKind::Queue(e) => Some(e),
            AppErrorKind::Event(e) => Some(e),
            AppErrorKind::Mapping(e) => Some(e),
            AppErrorKind::BadRequest(_) => None,
        }
    }
}

/// JSON error response structure with error ID for correlation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub error_id: Uuid,
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        Self::new(AppErrorKind::Queue(e))
    }
}

impl From<EventError> for AppError {
    fn from(e: EventError) -> Self {
        Self::new(AppErrorKind::Event(e))
    }
}

impl From<MappingError> for AppError {
    fn from(e: MappingError) -> Self {
        Self::new(AppErrorKind::Mapping(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            error!(error_id = %self.id, error = %self, source = ?self.source(), "internal error");
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qaint_store::StoreError;

    #[test]
    fn app_error_has_unique_id() {
        let err1 = AppError::new(AppErrorKind::Queue(QueueError::NotFound("a".into())));
        let err2 = AppError::new(AppErrorKind::Queue(QueueError::NotFound("a".into())));
        assert_ne!(err1.error_id(), err2.error_id());
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::from(QueueError::NotFound("op-1".into()));
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), ErrorCode::NotFound);
    }

    #[test]
    fn store_conflict_maps_to_409() {
        let err = AppError::from(MappingError::from(StoreError::conflict("mappings", "dup")));
        assert_eq!(err.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn bad_request_maps_to_400() {
        let err = AppError::bad_request("missing field 'test_name'");
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        let response = err.to_response();
        assert_eq!(response.message, "missing field 'test_name'");
    }

    #[test]
    fn error_response_serialization() {
        let err = AppError::from(QueueError::NotFound("op-1".into()));
        let json = serde_json::to_string(&err.to_response()).unwrap();
        assert!(json.contains("\"code\":\"NOT_FOUND\""));
        assert!(json.contains("\"errorId\""));
    }
}
