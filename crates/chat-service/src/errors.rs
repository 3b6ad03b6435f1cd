//! Chat service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Messages
//! returned to clients are generic; the underlying cause is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Chat service error type.
///
/// Maps to HTTP status codes:
/// - Database, Serialization, Internal: 500 Internal Server Error
/// - Timeout: 504 Gateway Timeout
/// - Identity: 502 Bad Gateway
/// - InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - QueueFull, HubUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Identity lookup failed: {0}")]
    Identity(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Hub request queue is full")]
    QueueFull,

    #[error("Hub is not running")]
    HubUnavailable,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::Database(_) | ChatError::Serialization(_) | ChatError::Internal(_) => 500,
            ChatError::Timeout(_) => 504,
            ChatError::Identity(_) => 502,
            ChatError::InvalidToken(_) => 401,
            ChatError::Forbidden(_) => 403,
            ChatError::QueueFull | ChatError::HubUnavailable => 503,
        }
    }

    /// Returns the error code string for metrics labels and response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            ChatError::Database(_) => "DATABASE_ERROR",
            ChatError::Timeout(_) => "TIMEOUT",
            ChatError::Identity(_) => "IDENTITY_UNAVAILABLE",
            ChatError::InvalidToken(_) => "INVALID_TOKEN",
            ChatError::Forbidden(_) => "FORBIDDEN",
            ChatError::QueueFull | ChatError::HubUnavailable => "SERVICE_UNAVAILABLE",
            ChatError::Serialization(_) | ChatError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe message. Internal detail stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Database(_) => "An internal database error occurred".to_string(),
            ChatError::Timeout(_) => "The request timed out".to_string(),
            ChatError::Identity(_) => "Unable to resolve user identity".to_string(),
            ChatError::InvalidToken(_) => "The access token is invalid or expired".to_string(),
            ChatError::Forbidden(reason) => reason.clone(),
            ChatError::QueueFull | ChatError::HubUnavailable => {
                "Service temporarily unavailable".to_string()
            }
            ChatError::Serialization(_) | ChatError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match &self {
            ChatError::Database(err) => {
                tracing::error!(target: "chat.errors", error = %err, "Database operation failed");
            }
            ChatError::Serialization(err) | ChatError::Internal(err) => {
                tracing::error!(target: "chat.errors", error = %err, "Internal error");
            }
            ChatError::Identity(err) | ChatError::Timeout(err) => {
                tracing::warn!(target: "chat.errors", error = %err, "Upstream dependency failed");
            }
            _ => {}
        }

        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display_database_error() {
        let error = ChatError::Database("connection refused".to_string());
        assert_eq!(format!("{}", error), "Database error: connection refused");
    }

    #[test]
    fn test_display_queue_full() {
        assert_eq!(
            format!("{}", ChatError::QueueFull),
            "Hub request queue is full"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ChatError::Database("x".into()).status_code(), 500);
        assert_eq!(ChatError::Timeout("save".into()).status_code(), 504);
        assert_eq!(ChatError::Identity("x".into()).status_code(), 502);
        assert_eq!(ChatError::InvalidToken("x".into()).status_code(), 401);
        assert_eq!(ChatError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(ChatError::QueueFull.status_code(), 503);
        assert_eq!(ChatError::HubUnavailable.status_code(), 503);
        assert_eq!(ChatError::Internal("x".into()).status_code(), 500);
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let error = ChatError::Database("password authentication failed for user chat".into());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "DATABASE_ERROR");
        assert_eq!(body["error"]["message"], "An internal database error occurred");
        assert!(!body.to_string().contains("password"));
    }

    #[tokio::test]
    async fn test_forbidden_response_carries_reason() {
        let error = ChatError::Forbidden("Origin not allowed".into());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert_eq!(body["error"]["message"], "Origin not allowed");
    }

    #[tokio::test]
    async fn test_identity_error_maps_to_bad_gateway() {
        let error = ChatError::Identity("user directory returned 500".into());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["message"], "Unable to resolve user identity");
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let chat_err: ChatError = err.into();
        assert!(matches!(chat_err, ChatError::Serialization(_)));
    }
}
