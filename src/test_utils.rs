pub mod test_helpers {
    use crate::{config::AppConfig, services::email_service::ConsoleEmailService, AppState};
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::{net::Ipv4Addr, sync::Arc};
    use tempfile::NamedTempFile;

    /// Configuration with development defaults and no environment lookups
    pub fn test_config() -> AppConfig {
        AppConfig {
            host: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            environment: "test".to_string(),
            access_token_lifetime: chrono::Duration::minutes(60),
            refresh_token_lifetime: chrono::Duration::days(1),
            cors_allowed_origin: None,
        }
    }

    /// Application state over `pool` with console email delivery
    pub fn test_state(pool: SqlitePool) -> AppState {
        AppState::new(pool, test_config(), Arc::new(ConsoleEmailService::new()))
    }

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Create a temporary file-based SQLite database for testing
    /// Useful when several connections must see the same data concurrently
    pub async fn create_test_db_file(
        max_connections: u32,
    ) -> Result<(SqlitePool, NamedTempFile), sqlx::Error> {
        let temp_file = NamedTempFile::new().map_err(sqlx::Error::Io)?;
        let db_path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| sqlx::Error::Configuration("Invalid database path".into()))?;
        let database_url = format!("sqlite://{}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok((pool, temp_file))
    }

    /// Insert a test user with hashed password
    pub async fn insert_test_user(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        password: &str,
        verified: bool,
    ) -> Result<i64, sqlx::Error> {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
            Argon2,
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                sqlx::Error::Configuration(format!("Password hashing failed: {}", e).into())
            })?
            .to_string();

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, email_verified) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(verified)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Promote a test user to staff
    pub async fn make_staff(pool: &SqlitePool, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET is_staff = 1, role = 'admin' WHERE id = ?")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Create a public test event administered by `admin_id`
    pub async fn create_test_event(
        pool: &SqlitePool,
        admin_id: i64,
        name: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO events (name, date, location) VALUES (?, '2030-06-01T18:00:00Z', 'Main hall')",
        )
        .bind(name)
        .execute(pool)
        .await?;
        let event_id = result.last_insert_rowid();

        sqlx::query("INSERT INTO event_admins (event_id, user_id) VALUES (?, ?)")
            .bind(event_id)
            .bind(admin_id)
            .execute(pool)
            .await?;

        Ok(event_id)
    }

    /// Create a registration with a known entry code
    pub async fn create_test_registration(
        pool: &SqlitePool,
        event_id: i64,
        user_id: i64,
        entry_code: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO registrations (event_id, user_id, entry_code) VALUES (?, ?, ?)",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(entry_code)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Issue a token pair for an existing user
    pub async fn login_tokens(
        state: &AppState,
        user_id: i64,
    ) -> Result<crate::models::TokenPair, crate::services::TokenError> {
        state.token_service.issue_pair(user_id).await
    }

    /// Expire every access token so the next call must refresh
    pub async fn expire_access_tokens(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE auth_tokens SET expires_at = 0 WHERE kind = 'access'")
            .execute(pool)
            .await?;
        Ok(())
    }
}
