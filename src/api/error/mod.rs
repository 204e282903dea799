use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::rag::ChatError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by a route, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// The message is shown to the caller, details only go to the log
    Internal(&'static str),
}

impl ApiError {
    #[inline]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[inline]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Log `err` and hide it behind `message`
    #[inline]
    pub fn internal(message: &'static str, err: impl std::fmt::Display) -> Self {
        error!("{}: {:#}", message, err);
        Self::Internal(message)
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<ChatError> for ApiError {
    #[inline]
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidRequest => Self::BadRequest(err.to_string()),
            ChatError::Generation(_) | ChatError::Timeout(_) => {
                Self::internal("Failed to generate response", err)
            }
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
