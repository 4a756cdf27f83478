use crate::error::AppError;
use crate::models::User;
use crate::repositories::user_repository::UserRepository;
use crate::repositories::RepositoryError;
use crate::services::email_service::{EmailError, EmailService};
use crate::services::sms_service::{SmsError, SmsService};
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::SqlitePool;
use std::sync::Arc;

const CODE_LIFETIME_MINUTES: i64 = 15;

/// Where a verification code is delivered, and which flag it sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Phone,
}

impl Channel {
    /// Value of `verification_codes.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Phone => "phone",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Channel::Email => "Email address",
            Channel::Phone => "Phone number",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("{} is already verified", .0.label())]
    AlreadyVerified(Channel),
    #[error("No phone number is configured")]
    MissingPhone,
    #[error("Invalid or expired verification code")]
    InvalidCode,
    #[error("Email error: {0}")]
    EmailError(#[from] EmailError),
    #[error("SMS error: {0}")]
    SmsError(#[from] SmsError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::AlreadyVerified(channel) => {
                AppError::validation(channel.kind(), err.to_string())
            }
            VerificationError::MissingPhone => AppError::validation("phone", err.to_string()),
            VerificationError::InvalidCode => AppError::validation("code", err.to_string()),
            VerificationError::EmailError(e) => AppError::Internal(e.to_string()),
            VerificationError::SmsError(e) => AppError::Internal(e.to_string()),
            VerificationError::DatabaseError(e) => AppError::Database(e),
            VerificationError::RepositoryError(e) => e.into(),
        }
    }
}

pub struct VerificationService {
    pool: SqlitePool,
    email_service: Arc<dyn EmailService>,
    sms_service: Arc<dyn SmsService>,
    user_repository: Arc<dyn UserRepository>,
}

impl VerificationService {
    pub fn new(
        pool: SqlitePool,
        email_service: Arc<dyn EmailService>,
        sms_service: Arc<dyn SmsService>,
        user_repository: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            pool,
            email_service,
            sms_service,
            user_repository,
        }
    }

    fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        format!("{:06}", rng.gen_range(0..1_000_000))
    }

    /// Issues a fresh code and delivers it over `channel`. Earlier unused
    /// codes for the channel stop working only once delivery succeeded.
    pub async fn send_code(
        &self,
        user: &User,
        channel: Channel,
    ) -> Result<IssuedCode, VerificationError> {
        let destination = match channel {
            Channel::Email if user.email_verified => {
                return Err(VerificationError::AlreadyVerified(channel))
            }
            Channel::Email => user.email.clone(),
            Channel::Phone if user.phone_verified => {
                return Err(VerificationError::AlreadyVerified(channel))
            }
            Channel::Phone => user
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|phone| !phone.is_empty())
                .ok_or(VerificationError::MissingPhone)?
                .to_string(),
        };

        let code = Self::generate_code();
        let expires_at = (Utc::now() + Duration::minutes(CODE_LIFETIME_MINUTES)).timestamp();

        let code_id = sqlx::query(
            "INSERT INTO verification_codes (user_id, code, kind, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&code)
        .bind(channel.kind())
        .bind(expires_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        if let Err(e) = self.deliver(channel, &destination, &code).await {
            // Nobody received this code
            if let Err(cleanup) = sqlx::query("DELETE FROM verification_codes WHERE id = ?")
                .bind(code_id)
                .execute(&self.pool)
                .await
            {
                tracing::error!("Failed to discard undelivered code {}: {}", code_id, cleanup);
            }
            return Err(e);
        }

        sqlx::query(
            "UPDATE verification_codes SET used = 1 WHERE user_id = ? AND kind = ? AND used = 0 AND id != ?",
        )
        .bind(user.id)
        .bind(channel.kind())
        .bind(code_id)
        .execute(&self.pool)
        .await?;

        tracing::info!("Sent {} verification code to user {}", channel.kind(), user.id);
        Ok(IssuedCode { code, expires_at })
    }

    async fn deliver(
        &self,
        channel: Channel,
        destination: &str,
        code: &str,
    ) -> Result<(), VerificationError> {
        match channel {
            Channel::Email => {
                self.email_service
                    .send_verification_code(destination, code)
                    .await?
            }
            Channel::Phone => {
                self.sms_service
                    .send_verification_code(destination, code)
                    .await?
            }
        }
        Ok(())
    }

    /// Consumes the latest live code matching `code` and marks the channel verified.
    pub async fn verify(
        &self,
        user_id: i64,
        channel: Channel,
        code: &str,
    ) -> Result<(), VerificationError> {
        let code = code.trim();
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(VerificationError::InvalidCode);
        }

        let code_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM verification_codes
            WHERE user_id = ? AND kind = ? AND code = ? AND used = 0 AND expires_at > ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(channel.kind())
        .bind(code)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        let code_id = code_id.ok_or(VerificationError::InvalidCode)?;

        let result = sqlx::query("UPDATE verification_codes SET used = 1 WHERE id = ? AND used = 0")
            .bind(code_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VerificationError::InvalidCode);
        }

        match channel {
            Channel::Email => self.user_repository.verify_email(user_id).await?,
            Channel::Phone => self.user_repository.verify_phone(user_id).await?,
        }
        tracing::info!("User {} verified their {}", user_id, channel.kind());
        Ok(())
    }
}
