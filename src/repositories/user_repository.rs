use crate::models::user::{Role, User};
use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{is_unique_violation, RepositoryError, RepositoryResult};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, phone, bio, email_verified, phone_verified, is_staff, \
     created_at";

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub email_verified: bool,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User>;
    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;
    async fn update_profile(
        &self,
        id: i64,
        email: &str,
        phone: Option<String>,
        bio: Option<String>,
    ) -> RepositoryResult<()>;
    async fn update_password(&self, id: i64, password_hash: &str) -> RepositoryResult<()>;
    async fn verify_email(&self, id: i64) -> RepositoryResult<()>;
    async fn verify_phone(&self, id: i64) -> RepositoryResult<()>;
    async fn set_staff(&self, id: i64, is_staff: bool) -> RepositoryResult<()>;
    async fn list_users(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<User>>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn require_affected(result: sqlx::sqlite::SqliteQueryResult) -> RepositoryResult<()> {
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("User"));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, phone, email_verified) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.email_verified)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => {
                let id = res.last_insert_rowid();
                self.find_by_id(id)
                    .await?
                    .ok_or(RepositoryError::NotFound("User"))
            }
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::AlreadyExists("User")),
            Err(e) => Err(RepositoryError::Database(e)),
        }
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_profile(
        &self,
        id: i64,
        email: &str,
        phone: Option<String>,
        bio: Option<String>,
    ) -> RepositoryResult<()> {
        // A changed phone number has to be verified again
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?,
                phone_verified = CASE WHEN phone IS ? THEN phone_verified ELSE 0 END,
                phone = ?,
                bio = ?
            WHERE id = ?
            "#,
        )
        .bind(email)
        .bind(phone.clone())
        .bind(phone)
        .bind(bio)
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => Self::require_affected(res),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::AlreadyExists("Email")),
            Err(e) => Err(RepositoryError::Database(e)),
        }
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::require_affected(result)
    }

    async fn verify_email(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET email_verified = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::require_affected(result)
    }

    async fn verify_phone(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET phone_verified = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::require_affected(result)
    }

    async fn set_staff(&self, id: i64, is_staff: bool) -> RepositoryResult<()> {
        let role = if is_staff { Role::Admin } else { Role::Attendee };
        let result = sqlx::query("UPDATE users SET is_staff = ?, role = ? WHERE id = ?")
            .bind(is_staff)
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Self::require_affected(result)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
