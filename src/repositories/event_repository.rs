use crate::models::{event::Event, user::UserSummary, CreateEventRequest};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{RepositoryError, RepositoryResult};

const EVENT_COLUMNS: &str = "e.id, e.name, e.description, e.date, e.location, e.capacity, \
     e.max_qr_codes, e.max_codes_per_user, e.is_public, e.created_at";

/// Who is asking for the event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(i64),
    Staff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub search: Option<String>,
    pub visibility: Option<Visibility>,
    /// Only events dated on or after this RFC 3339 instant.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait EventRepository: Send + Sync {
    async fn create_event(
        &self,
        request: CreateEventRequest,
        creator_id: i64,
    ) -> RepositoryResult<Event>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Event>>;
    async fn list_visible(&self, viewer: Viewer, filter: EventFilter)
        -> RepositoryResult<Vec<Event>>;
    async fn delete_event(&self, id: i64) -> RepositoryResult<()>;
    async fn add_admin(&self, event_id: i64, user_id: i64) -> RepositoryResult<()>;
    async fn remove_admin(&self, event_id: i64, user_id: i64) -> RepositoryResult<()>;
    async fn is_admin(&self, event_id: i64, user_id: i64) -> RepositoryResult<bool>;
    async fn list_admins(&self, event_id: i64) -> RepositoryResult<Vec<UserSummary>>;
    async fn list_participants(&self, event_id: i64) -> RepositoryResult<Vec<UserSummary>>;
}

pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn create_event(
        &self,
        request: CreateEventRequest,
        creator_id: i64,
    ) -> RepositoryResult<Event> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (name, description, date, location, capacity, max_qr_codes, max_codes_per_user, is_public)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.date)
        .bind(&request.location)
        .bind(request.capacity)
        .bind(request.max_qr_codes)
        .bind(request.max_codes_per_user)
        .bind(request.is_public)
        .execute(&mut *tx)
        .await?;

        let event_id = result.last_insert_rowid();

        sqlx::query("INSERT INTO event_admins (event_id, user_id) VALUES (?, ?)")
            .bind(event_id)
            .bind(creator_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(event_id)
            .await?
            .ok_or(RepositoryError::NotFound("Event"))
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events e WHERE e.id = ?",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn list_visible(
        &self,
        viewer: Viewer,
        filter: EventFilter,
    ) -> RepositoryResult<Vec<Event>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT DISTINCT {} FROM events e LEFT JOIN event_admins ea ON ea.event_id = e.id WHERE 1 = 1",
            EVENT_COLUMNS
        ));

        match viewer {
            Viewer::Anonymous => {
                query.push(" AND e.is_public = 1");
            }
            Viewer::User(user_id) => {
                query.push(" AND (e.is_public = 1 OR ea.user_id = ");
                query.push_bind(user_id);
                query.push(")");
            }
            Viewer::Staff => {}
        }

        if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
            let pattern = format!("%{}%", search.trim());
            query.push(" AND (e.name LIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR e.description LIKE ");
            query.push_bind(pattern.clone());
            query.push(" OR e.location LIKE ");
            query.push_bind(pattern);
            query.push(")");
        }

        match filter.visibility {
            Some(Visibility::Public) => {
                query.push(" AND e.is_public = 1");
            }
            Some(Visibility::Private) => {
                query.push(" AND e.is_public = 0");
            }
            None => {}
        }

        if let Some(date_from) = filter.date_from {
            query.push(" AND e.date >= ");
            query.push_bind(date_from);
        }

        if let Some(date_to) = filter.date_to {
            query.push(" AND e.date <= ");
            query.push_bind(date_to);
        }

        query.push(" ORDER BY e.date DESC, e.id DESC");

        let events = query
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn delete_event(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Event"));
        }

        Ok(())
    }

    async fn add_admin(&self, event_id: i64, user_id: i64) -> RepositoryResult<()> {
        sqlx::query("INSERT OR IGNORE INTO event_admins (event_id, user_id) VALUES (?, ?)")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove_admin(&self, event_id: i64, user_id: i64) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM event_admins WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn is_admin(&self, event_id: i64, user_id: i64) -> RepositoryResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM event_admins WHERE event_id = ? AND user_id = ?",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn list_admins(&self, event_id: i64) -> RepositoryResult<Vec<UserSummary>> {
        let admins = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT u.id, u.username, u.email, u.role
            FROM event_admins ea
            JOIN users u ON u.id = ea.user_id
            WHERE ea.event_id = ?
            ORDER BY u.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(admins)
    }

    async fn list_participants(&self, event_id: i64) -> RepositoryResult<Vec<UserSummary>> {
        let participants = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT DISTINCT u.id, u.username, u.email, u.role
            FROM registrations r
            JOIN users u ON u.id = r.user_id
            WHERE r.event_id = ?
            ORDER BY u.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }
}
