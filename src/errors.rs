use axum::{
    http::{header::HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

pub static RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Per-client submission quota exhausted.
    RateLimited {
        /// Configured maximum submissions per window, advertised in headers.
        limit: u32,
    },
    /// The outbound email dispatch failed. `detail` is logged server-side only;
    /// the caller sees the sanitized `user_message`.
    DispatchError {
        user_message: String,
        detail: String,
    },
    /// Internal server error.
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::RateLimited { limit } => {
                write!(f, "Rate limited: maximum {} submissions per window", limit)
            }
            AppError::DispatchError { user_message, .. } => {
                write!(f, "Dispatch error: {}", user_message)
            }
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and a
    /// `{status, error, message}` JSON body. Upstream detail is logged
    /// server-side and never echoed to the caller.
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "validation_error".to_string(),
                msg.clone(),
            ),
            AppError::RateLimited { limit } => {
                tracing::warn!("Submission rejected by rate limiter (limit {})", limit);
                let body = Json(json!({
                    "status": "error",
                    "error": "rate_limited",
                    "message": "Too many submissions, please try again later",
                }));
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        (RATE_LIMIT_LIMIT.clone(), limit.to_string()),
                        (RATE_LIMIT_REMAINING.clone(), "0".to_string()),
                    ],
                    body,
                )
                    .into_response();
            }
            AppError::DispatchError {
                user_message,
                detail,
            } => {
                tracing::error!("Email dispatch failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "dispatch_failed".to_string(),
                    user_message.clone(),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".to_string(),
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": "error",
            "error": error,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::DispatchError {
            user_message: "Email delivery failed, please try again".to_string(),
            detail: err.to_string(),
        }
    }
}
