use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::Access => "evt_access_",
            TokenKind::Refresh => "evt_refresh_",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuthToken {
    pub id: i64,
    pub token_hash: String,
    pub kind: String,
    pub user_id: i64,
    pub expires_at: i64,
    pub created_at: i64,
}

impl AuthToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Body of `POST /token/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Body of `POST /token/refresh/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access: String,
}
