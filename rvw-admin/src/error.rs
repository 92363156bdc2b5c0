//! Error types for rvw-admin
//!
//! Every handler returns [`ApiResult`]. Client errors carry their message to
//! the caller; server-side failures are logged and answered with a generic
//! message.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing, expired or invalid session (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// CSRF token missing or wrong (403)
    #[error("CSRF validation failed")]
    CsrfFailed,

    /// Conflict with current record state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request body over the size limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// A dependency such as the proof scorer failed (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] rvw_common::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::CsrfFailed => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Common(err) => match err {
                rvw_common::Error::NotFound(_) => StatusCode::NOT_FOUND,
                rvw_common::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                rvw_common::Error::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) | ApiError::Database(_) | ApiError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::CsrfFailed => "CSRF_FAILED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Common(err) => match err {
                rvw_common::Error::NotFound(_) => "NOT_FOUND",
                rvw_common::Error::InvalidInput(_) => "BAD_REQUEST",
                rvw_common::Error::Conflict(_) => "CONFLICT",
                _ => "INTERNAL_ERROR",
            },
            ApiError::Internal(_) | ApiError::Other(_) => "INTERNAL_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Client-facing message; server errors are not echoed
    fn public_message(&self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Upstream(msg) => msg.clone(),
            ApiError::CsrfFailed => "Missing or invalid CSRF token".to_string(),
            ApiError::Common(
                rvw_common::Error::NotFound(msg)
                | rvw_common::Error::InvalidInput(msg)
                | rvw_common::Error::Conflict(msg),
            ) => msg.clone(),
            _ => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_errors_map_to_client_statuses() {
        let err: ApiError = rvw_common::Error::InvalidInput("bad".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "bad");

        let err: ApiError = rvw_common::Error::Conflict("busy".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = rvw_common::Error::Config("secret path".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn test_query_rejection_is_bad_request() {
        let uri: axum::http::Uri = "/api/users?page=first".parse().unwrap();
        let rejection = axum::extract::Query::<crate::listing::ListParams>::try_from_uri(&uri)
            .unwrap_err();
        let err: ApiError = rejection.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn test_csrf_is_forbidden() {
        assert_eq!(ApiError::CsrfFailed.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::CsrfFailed.code(), "CSRF_FAILED");
    }
}
