use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::repositories::RepositoryError;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Machine-readable code sent with 403 responses for unverified accounts.
pub const EMAIL_NOT_VERIFIED: &str = "EMAIL_NOT_VERIFIED";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication credentials were not provided")]
    Unauthenticated,

    #[error("No active account found with the given credentials")]
    InvalidCredentials,

    #[error("Token is invalid or expired")]
    TokenNotValid,

    #[error("Email address must be verified before using this service")]
    EmailNotVerified,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    LimitReached(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::TokenNotValid => (StatusCode::UNAUTHORIZED, "token_not_valid"),
            AppError::EmailNotVerified => (StatusCode::FORBIDDEN, EMAIL_NOT_VERIFIED),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "permission_denied"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation { .. } => (StatusCode::BAD_REQUEST, "invalid"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::LimitReached(_) => (StatusCode::BAD_REQUEST, "limit_reached"),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::AlreadyExists(what) => {
                AppError::Conflict(format!("{} already exists", what))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("body", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation("path", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation("query", rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                json!({ "detail": "Internal server error", "error_code": error_code })
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({ "detail": "Internal server error", "error_code": error_code })
            }
            AppError::EmailNotVerified => json!({
                "detail": self.to_string(),
                "error_code": error_code,
                "email_verified": false,
            }),
            AppError::Validation { field, message } => json!({
                "detail": message,
                "error_code": error_code,
                "field": field,
            }),
            _ => json!({ "detail": self.to_string(), "error_code": error_code }),
        };

        (status, Json(body)).into_response()
    }
}
