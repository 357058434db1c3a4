use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use winston_rs_protocol::time::{format_fdsn_time, now_j2k};

use crate::constraint::ConstraintError;
use crate::store::StorageError;

/// An FDSN request failure: a status code and a caller-facing message.
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct FdsnRequestError {
    pub status: StatusCode,
    pub message: String,
}

impl FdsnRequestError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Plain-text body: code, reason, message, echoed URI, timestamp and
    /// service version.
    pub fn body(&self, uri: &str, service_version: &str) -> String {
        format!(
            "Error {}: {}\n\n{}\n\nRequest:\n{}\n\nRequest Submitted:\n{}\n\nService version:\n{}\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or("Unknown"),
            self.message,
            uri,
            format_fdsn_time(now_j2k()),
            service_version,
        )
    }

    pub fn render(&self, uri: &str, service_version: &str) -> Response {
        if self.status == StatusCode::NO_CONTENT {
            return StatusCode::NO_CONTENT.into_response();
        }
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.body(uri, service_version),
        )
            .into_response()
    }
}

impl From<ConstraintError> for FdsnRequestError {
    fn from(e: ConstraintError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<StorageError> for FdsnRequestError {
    fn from(e: StorageError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for FdsnRequestError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("query task failed: {e}"))
    }
}
