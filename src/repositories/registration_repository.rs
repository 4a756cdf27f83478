use crate::models::{registration::Registration, user::UserSummary};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

use super::{is_unique_violation, RepositoryError, RepositoryResult};

const REGISTRATION_COLUMNS: &str =
    "r.id, r.event_id, r.user_id, r.entry_code, r.used, r.used_at, r.attendee_metadata, r.created_at";

#[derive(Debug, Clone, PartialEq)]
pub struct NewRegistration {
    pub event_id: i64,
    pub user_id: i64,
    pub entry_code: String,
    pub attendee_metadata: String,
}

/// Caps checked in the same statement that inserts the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationLimits {
    pub total: Option<i64>,
    pub per_user: Option<i64>,
}

/// A registration joined with its holder and event, as needed at the door.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub registration: Registration,
    pub holder: UserSummary,
    pub event_name: String,
}

/// One line of an event's registration export.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ExportRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub attendee_metadata: String,
    pub used: bool,
    pub used_at: Option<String>,
    pub entry_code: String,
}

#[derive(FromRow)]
struct ResolvedEntryRow {
    id: i64,
    event_id: i64,
    user_id: i64,
    entry_code: String,
    used: bool,
    used_at: Option<String>,
    attendee_metadata: String,
    created_at: Option<String>,
    username: String,
    email: String,
    role: String,
    event_name: String,
}

impl From<ResolvedEntryRow> for ResolvedEntry {
    fn from(row: ResolvedEntryRow) -> Self {
        Self {
            holder: UserSummary {
                id: row.user_id,
                username: row.username,
                email: row.email,
                role: row.role,
            },
            event_name: row.event_name,
            registration: Registration {
                id: row.id,
                event_id: row.event_id,
                user_id: row.user_id,
                entry_code: row.entry_code,
                used: row.used,
                used_at: row.used_at,
                attendee_metadata: row.attendee_metadata,
                created_at: row.created_at,
            },
        }
    }
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait RegistrationRepository: Send + Sync {
    /// Inserts the registration unless a limit would be exceeded.
    /// Returns `None` when a limit blocked the insert.
    async fn create_within_limits(
        &self,
        registration: NewRegistration,
        limits: RegistrationLimits,
    ) -> RepositoryResult<Option<Registration>>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Registration>>;
    async fn resolve_by_id(&self, id: i64) -> RepositoryResult<Option<ResolvedEntry>>;
    async fn resolve_by_code(&self, entry_code: &str) -> RepositoryResult<Option<ResolvedEntry>>;
    async fn list_for_user(&self, user_id: i64) -> RepositoryResult<Vec<ResolvedEntry>>;
    async fn list_all(&self) -> RepositoryResult<Vec<ResolvedEntry>>;
    async fn export_rows(&self, event_id: i64) -> RepositoryResult<Vec<ExportRow>>;
    async fn count_for_event(&self, event_id: i64) -> RepositoryResult<i64>;
    async fn count_for_user(&self, event_id: i64, user_id: i64) -> RepositoryResult<i64>;
    /// Flips `used` from false to true. Returns false if it was already set.
    async fn mark_used(&self, id: i64, used_at: &str) -> RepositoryResult<bool>;
    async fn delete_registration(&self, id: i64) -> RepositoryResult<()>;
    /// Drops every registration `user_id` holds for the event. Returns the count.
    async fn delete_for_participant(&self, event_id: i64, user_id: i64) -> RepositoryResult<u64>;
    async fn log_email(
        &self,
        registration_id: i64,
        recipient: &str,
        subject: &str,
        error_text: Option<String>,
    ) -> RepositoryResult<()>;
}

pub struct SqliteRegistrationRepository {
    pool: SqlitePool,
}

impl SqliteRegistrationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn resolved_select() -> String {
        format!(
            r#"
            SELECT {}, u.username, u.email, u.role, e.name AS event_name
            FROM registrations r
            JOIN users u ON u.id = r.user_id
            JOIN events e ON e.id = r.event_id
            "#,
            REGISTRATION_COLUMNS
        )
    }
}

#[async_trait]
impl RegistrationRepository for SqliteRegistrationRepository {
    async fn create_within_limits(
        &self,
        registration: NewRegistration,
        limits: RegistrationLimits,
    ) -> RepositoryResult<Option<Registration>> {
        let result = sqlx::query(
            r#"
            INSERT INTO registrations (event_id, user_id, entry_code, attendee_metadata)
            SELECT ?, ?, ?, ?
            WHERE (? IS NULL OR (SELECT COUNT(*) FROM registrations WHERE event_id = ?) < ?)
              AND (? IS NULL OR (SELECT COUNT(*) FROM registrations WHERE event_id = ? AND user_id = ?) < ?)
            "#,
        )
        .bind(registration.event_id)
        .bind(registration.user_id)
        .bind(&registration.entry_code)
        .bind(&registration.attendee_metadata)
        .bind(limits.total)
        .bind(registration.event_id)
        .bind(limits.total)
        .bind(limits.per_user)
        .bind(registration.event_id)
        .bind(registration.user_id)
        .bind(limits.per_user)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(res) => res,
            Err(e) if is_unique_violation(&e) => {
                return Err(RepositoryError::AlreadyExists("Entry code"))
            }
            Err(e) => return Err(RepositoryError::Database(e)),
        };

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(result.last_insert_rowid()).await
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Registration>> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations r WHERE r.id = ?",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    async fn resolve_by_id(&self, id: i64) -> RepositoryResult<Option<ResolvedEntry>> {
        let row = sqlx::query_as::<_, ResolvedEntryRow>(&format!(
            "{} WHERE r.id = ?",
            Self::resolved_select()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ResolvedEntry::from))
    }

    async fn resolve_by_code(&self, entry_code: &str) -> RepositoryResult<Option<ResolvedEntry>> {
        let row = sqlx::query_as::<_, ResolvedEntryRow>(&format!(
            "{} WHERE r.entry_code = ?",
            Self::resolved_select()
        ))
        .bind(entry_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ResolvedEntry::from))
    }

    async fn list_for_user(&self, user_id: i64) -> RepositoryResult<Vec<ResolvedEntry>> {
        // Own registrations plus every registration of an administered event
        let rows = sqlx::query_as::<_, ResolvedEntryRow>(&format!(
            r#"{}
            WHERE r.user_id = ?
               OR r.event_id IN (SELECT event_id FROM event_admins WHERE user_id = ?)
            ORDER BY r.id
            "#,
            Self::resolved_select()
        ))
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ResolvedEntry::from).collect())
    }

    async fn list_all(&self) -> RepositoryResult<Vec<ResolvedEntry>> {
        let rows = sqlx::query_as::<_, ResolvedEntryRow>(&format!(
            "{} ORDER BY r.id",
            Self::resolved_select()
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ResolvedEntry::from).collect())
    }

    async fn export_rows(&self, event_id: i64) -> RepositoryResult<Vec<ExportRow>> {
        let rows = sqlx::query_as::<_, ExportRow>(
            r#"
            SELECT r.id, u.username, u.email, u.phone, r.attendee_metadata, r.used, r.used_at, r.entry_code
            FROM registrations r
            JOIN users u ON u.id = r.user_id
            WHERE r.event_id = ?
            ORDER BY r.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_for_event(&self, event_id: i64) -> RepositoryResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registrations WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_for_user(&self, event_id: i64, user_id: i64) -> RepositoryResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE event_id = ? AND user_id = ?",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_used(&self, id: i64, used_at: &str) -> RepositoryResult<bool> {
        let result =
            sqlx::query("UPDATE registrations SET used = 1, used_at = ? WHERE id = ? AND used = 0")
                .bind(used_at)
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_registration(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM registrations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Registration"));
        }

        Ok(())
    }

    async fn delete_for_participant(&self, event_id: i64, user_id: i64) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM registrations WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn log_email(
        &self,
        registration_id: i64,
        recipient: &str,
        subject: &str,
        error_text: Option<String>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_logs (registration_id, recipient, subject, success, error_text)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(registration_id)
        .bind(recipient)
        .bind(subject)
        .bind(error_text.is_none())
        .bind(error_text)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
