use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::error::EMAIL_NOT_VERIFIED;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error, please try again: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unauthorized: {detail}")]
    Unauthorized { detail: String },

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("{detail}")]
    EmailNotVerified { detail: String },

    #[error("Request failed with status {status} ({code}): {detail}")]
    Business {
        status: u16,
        code: String,
        detail: String,
    },

    #[error("{field}: {detail}")]
    Validation { field: String, detail: String },

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Credential storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Structured error body shared by every endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
}

impl ErrorBody {
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    pub fn is_email_not_verified(&self) -> bool {
        self.error_code.as_deref() == Some(EMAIL_NOT_VERIFIED)
    }

    pub fn detail_or(&self, status: StatusCode) -> String {
        self.detail.clone().unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
    }
}

impl ClientError {
    /// Maps a non-success response to its typed error.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let parsed = ErrorBody::parse(body);
        let detail = parsed.detail_or(status);

        if status == StatusCode::UNAUTHORIZED {
            return ClientError::Unauthorized { detail };
        }
        if status == StatusCode::FORBIDDEN && parsed.is_email_not_verified() {
            return ClientError::EmailNotVerified { detail };
        }
        if status == StatusCode::BAD_REQUEST {
            if let Some(field) = parsed.field {
                return ClientError::Validation { field, detail };
            }
        }

        ClientError::Business {
            status: status.as_u16(),
            code: parsed.error_code.unwrap_or_else(|| "error".to_string()),
            detail,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_email_not_verified() {
        let body = br#"{"detail":"verify first","error_code":"EMAIL_NOT_VERIFIED","email_verified":false}"#;
        match ClientError::from_response(StatusCode::FORBIDDEN, body) {
            ClientError::EmailNotVerified { detail } => assert_eq!(detail, "verify first"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn maps_field_validation() {
        let body = br#"{"detail":"too short","error_code":"invalid","field":"password"}"#;
        match ClientError::from_response(StatusCode::BAD_REQUEST, body) {
            ClientError::Validation { field, detail } => {
                assert_eq!(field, "password");
                assert_eq!(detail, "too short");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn plain_forbidden_is_business() {
        let body = br#"{"detail":"nope","error_code":"permission_denied"}"#;
        match ClientError::from_response(StatusCode::FORBIDDEN, body) {
            ClientError::Business { status, code, .. } => {
                assert_eq!(status, 403);
                assert_eq!(code, "permission_denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unparseable_body_falls_back_to_reason() {
        match ClientError::from_response(StatusCode::INTERNAL_SERVER_ERROR, b"<html>") {
            ClientError::Business { detail, code, .. } => {
                assert_eq!(detail, "Internal Server Error");
                assert_eq!(code, "error");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
