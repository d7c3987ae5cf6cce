use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::{db::StoreError, search::client::SearchError};

/// Every handler-level failure ends up here and leaves as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("upstream: {0}")]
    Upstream(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Api(msg) => AppError::Upstream(msg),
            SearchError::Transport(e) => AppError::Upstream(e.to_string()),
            SearchError::Decode(msg) => AppError::Upstream(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            ),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(msg) => {
                warn!(error = %msg, "search provider error");
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::Store(StoreError::DuplicateIdentity) => (
                StatusCode::BAD_REQUEST,
                "Email already registered".to_string(),
            ),
            AppError::Store(e @ StoreError::Unavailable(_)) => {
                error!(error = %e, "database connection error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database connection error. Please try again later.".to_string(),
                )
            }
            AppError::Store(e @ StoreError::Query(_)) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error. Please try again later.".to_string(),
                )
            }
            AppError::Unexpected(e) => {
                error!(error = ?e, "unexpected error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
