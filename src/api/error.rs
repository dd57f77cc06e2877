use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("{0}")]
    CohortLocked(String),
    #[error("{0}")]
    OutsideWindow(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyCheckedIn(String),
    #[error("{0}")]
    AlreadyCheckedOut(String),
    #[error("{0}")]
    AttendanceAlreadyComplete(String),
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),
    #[error("store failure: {0}")]
    Store(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            ApiError::CohortLocked(_) | ApiError::OutsideWindow(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyCheckedIn(_)
            | ApiError::AlreadyCheckedOut(_)
            | ApiError::AttendanceAlreadyComplete(_) => StatusCode::CONFLICT,
            ApiError::DuplicateIdentity(_) | ApiError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Store detail stays in the server log; the client gets a
        // generic message.
        let message = match &self {
            ApiError::Store(detail) => {
                error!(detail = %detail, "store operation failed");
                "internal storage error, try again".to_string()
            }
            ApiError::DuplicateIdentity(detail) => {
                error!(detail = %detail, "identity integrity violation");
                "data integrity error; contact the coordination team".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Store(e.to_string())
    }
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
