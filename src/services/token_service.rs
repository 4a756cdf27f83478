use crate::error::AppError;
use crate::models::{AccessTokenResponse, AuthToken, TokenKind, TokenPair};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is invalid or expired")]
    Invalid,
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => AppError::TokenNotValid,
            TokenError::DatabaseError(e) => AppError::Database(e),
        }
    }
}

/// Issues and checks opaque bearer tokens. Only SHA-256 hashes are stored.
pub struct TokenService {
    pool: SqlitePool,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
}

impl TokenService {
    pub fn new(pool: SqlitePool, access_lifetime: Duration, refresh_lifetime: Duration) -> Self {
        Self {
            pool,
            access_lifetime,
            refresh_lifetime,
        }
    }

    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn issue_pair(&self, user_id: i64) -> Result<TokenPair, TokenError> {
        let access = self.issue(TokenKind::Access, user_id).await?;
        let refresh = self.issue(TokenKind::Refresh, user_id).await?;
        Ok(TokenPair { access, refresh })
    }

    /// Exchanges a refresh token for a new access token. The refresh token
    /// stays valid until it expires.
    pub async fn refresh_access(
        &self,
        refresh_token: &str,
    ) -> Result<AccessTokenResponse, TokenError> {
        let stored = self.lookup(TokenKind::Refresh, refresh_token).await?;
        let access = self.issue(TokenKind::Access, stored.user_id).await?;
        tracing::debug!("Refreshed access token for user {}", stored.user_id);
        Ok(AccessTokenResponse { access })
    }

    /// Returns the user id bound to a live access token.
    pub async fn validate_access(&self, access_token: &str) -> Result<i64, TokenError> {
        let stored = self.lookup(TokenKind::Access, access_token).await?;
        Ok(stored.user_id)
    }

    /// Removes expired rows. Returns how many were deleted.
    pub async fn purge_expired(&self) -> Result<u64, TokenError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn issue(&self, kind: TokenKind, user_id: i64) -> Result<String, TokenError> {
        let token = format!("{}{}", kind.prefix(), Uuid::new_v4().simple());
        let lifetime = match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        };
        let expires_at = (Utc::now() + lifetime).timestamp();

        sqlx::query(
            r#"
            INSERT INTO auth_tokens (token_hash, kind, user_id, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Self::hash_token(&token))
        .bind(kind.as_str())
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    async fn lookup(&self, kind: TokenKind, token: &str) -> Result<AuthToken, TokenError> {
        if !token.starts_with(kind.prefix()) {
            return Err(TokenError::Invalid);
        }

        let stored = sqlx::query_as::<_, AuthToken>(
            r#"
            SELECT id, token_hash, kind, user_id, expires_at, created_at
            FROM auth_tokens
            WHERE token_hash = ? AND kind = ?
            "#,
        )
        .bind(Self::hash_token(token))
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TokenError::Invalid)?;

        if stored.is_expired(Utc::now().timestamp()) {
            return Err(TokenError::Invalid);
        }

        Ok(stored)
    }
}
