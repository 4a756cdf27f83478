use crate::error::AppError;
use crate::models::{registration::attendee_name, CreateEventRequest, EventView, User, UserSummary};
use crate::repositories::{
    EventFilter, EventRepository, RegistrationRepository, RepositoryError, UserRepository, Viewer,
    Visibility,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EventServiceError {
    #[error("Event name is required")]
    MissingName,
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("{0} must be a positive number")]
    InvalidLimit(&'static str),
    #[error("Event not found")]
    EventNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("You do not have permission to manage this event")]
    NotAdmin,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

impl From<EventServiceError> for AppError {
    fn from(err: EventServiceError) -> Self {
        match err {
            EventServiceError::MissingName => AppError::validation("name", err.to_string()),
            EventServiceError::InvalidDate(_) => AppError::validation("date", err.to_string()),
            EventServiceError::InvalidLimit(field) => AppError::validation(field, err.to_string()),
            EventServiceError::EventNotFound => AppError::NotFound("Event"),
            EventServiceError::UserNotFound => AppError::NotFound("User"),
            EventServiceError::NotAdmin => AppError::forbidden(err.to_string()),
            EventServiceError::Csv(e) => AppError::Internal(e.to_string()),
            EventServiceError::RepositoryError(e) => e.into(),
        }
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const EXPORT_HEADER: [&str; 8] = [
    "id", "username", "email", "phone", "attendee", "used", "used_at", "entry_code",
];

/// Query parameters accepted by the event list.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct EventListQuery {
    pub search: Option<String>,
    pub visibility: Option<String>,
    #[serde(default)]
    pub upcoming: bool,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

pub struct EventService {
    events: Arc<dyn EventRepository>,
    users: Arc<dyn UserRepository>,
    registrations: Arc<dyn RegistrationRepository>,
}

impl EventService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserRepository>,
        registrations: Arc<dyn RegistrationRepository>,
    ) -> Self {
        Self {
            events,
            users,
            registrations,
        }
    }

    pub async fn list(
        &self,
        viewer: Option<&User>,
        query: EventListQuery,
    ) -> Result<Vec<EventView>, EventServiceError> {
        let visibility = match query.visibility.as_deref() {
            Some("public") => Some(Visibility::Public),
            Some("private") => Some(Visibility::Private),
            _ => None,
        };

        let date_from = match (query.upcoming, query.date_from) {
            (true, _) => Some(format_instant(Utc::now())),
            (false, Some(raw)) => Some(normalize_date(&raw)?),
            (false, None) => None,
        };
        let date_to = query.date_to.map(|raw| normalize_date(&raw)).transpose()?;

        let filter = EventFilter {
            search: query.search,
            visibility,
            date_from,
            date_to,
        };

        let events = self.events.list_visible(viewer_of(viewer), filter).await?;

        let mut views = Vec::with_capacity(events.len());
        for event in events {
            let admins = self.events.list_admins(event.id).await?;
            views.push(EventView::new(event, admins));
        }
        Ok(views)
    }

    pub async fn create(
        &self,
        creator: &User,
        mut request: CreateEventRequest,
    ) -> Result<EventView, EventServiceError> {
        request.name = request.name.trim().to_string();
        if request.name.is_empty() {
            return Err(EventServiceError::MissingName);
        }
        request.date = normalize_date(&request.date)?;
        if request.capacity < 0 {
            return Err(EventServiceError::InvalidLimit("capacity"));
        }
        if request.max_qr_codes.is_some_and(|n| n < 1) {
            return Err(EventServiceError::InvalidLimit("max_qr_codes"));
        }
        if request.max_codes_per_user.is_some_and(|n| n < 1) {
            return Err(EventServiceError::InvalidLimit("max_codes_per_user"));
        }

        let event = self.events.create_event(request, creator.id).await?;
        tracing::info!("User {} created event {} ({})", creator.id, event.name, event.id);

        let admins = self.events.list_admins(event.id).await?;
        Ok(EventView::new(event, admins))
    }

    /// Private events are reported as missing to anyone who cannot see them.
    pub async fn get(
        &self,
        viewer: Option<&User>,
        event_id: i64,
    ) -> Result<EventView, EventServiceError> {
        let event = self
            .events
            .find_by_id(event_id)
            .await?
            .ok_or(EventServiceError::EventNotFound)?;

        if !event.is_public {
            let allowed = match viewer {
                Some(user) => self.can_manage(user, event_id).await?,
                None => false,
            };
            if !allowed {
                return Err(EventServiceError::EventNotFound);
            }
        }

        let admins = self.events.list_admins(event_id).await?;
        Ok(EventView::new(event, admins))
    }

    pub async fn delete(&self, actor: &User, event_id: i64) -> Result<(), EventServiceError> {
        self.require_manager(actor, event_id).await?;
        self.events.delete_event(event_id).await?;
        tracing::info!("User {} deleted event {}", actor.id, event_id);
        Ok(())
    }

    pub async fn add_admin(
        &self,
        actor: &User,
        event_id: i64,
        user_id: i64,
    ) -> Result<(), EventServiceError> {
        self.require_manager(actor, event_id).await?;
        self.require_user(user_id).await?;
        self.events.add_admin(event_id, user_id).await?;
        Ok(())
    }

    pub async fn remove_admin(
        &self,
        actor: &User,
        event_id: i64,
        user_id: i64,
    ) -> Result<(), EventServiceError> {
        self.require_manager(actor, event_id).await?;
        self.require_user(user_id).await?;
        self.events.remove_admin(event_id, user_id).await?;
        Ok(())
    }

    pub async fn participants(
        &self,
        actor: &User,
        event_id: i64,
    ) -> Result<Vec<UserSummary>, EventServiceError> {
        self.require_manager(actor, event_id).await?;
        Ok(self.events.list_participants(event_id).await?)
    }

    /// Deletes all registrations `user_id` holds for the event.
    pub async fn remove_participant(
        &self,
        actor: &User,
        event_id: i64,
        user_id: i64,
    ) -> Result<u64, EventServiceError> {
        self.require_manager(actor, event_id).await?;
        self.require_user(user_id).await?;
        let removed = self
            .registrations
            .delete_for_participant(event_id, user_id)
            .await?;
        tracing::info!(
            "Removed {} registration(s) of user {} from event {}",
            removed,
            user_id,
            event_id
        );
        Ok(removed)
    }

    /// CSV of every registration for the event, with a UTF-8 BOM so
    /// spreadsheet tools pick the right encoding.
    pub async fn export_registrations(
        &self,
        actor: &User,
        event_id: i64,
    ) -> Result<Vec<u8>, EventServiceError> {
        self.require_manager(actor, event_id).await?;
        let rows = self.registrations.export_rows(event_id).await?;

        let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
        writer.write_record(EXPORT_HEADER)?;
        for row in &rows {
            let id = row.id.to_string();
            let attendee = attendee_name(&row.attendee_metadata, &row.username);
            writer.write_record([
                id.as_str(),
                row.username.as_str(),
                row.email.as_str(),
                row.phone.as_deref().unwrap_or(""),
                attendee.as_str(),
                if row.used { "yes" } else { "no" },
                row.used_at.as_deref().unwrap_or(""),
                row.entry_code.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;

        tracing::info!(
            "User {} exported {} registration(s) of event {}",
            actor.id,
            rows.len(),
            event_id
        );
        Ok(bytes)
    }

    pub async fn can_manage(&self, user: &User, event_id: i64) -> Result<bool, EventServiceError> {
        if user.is_staff {
            return Ok(true);
        }
        Ok(self.events.is_admin(event_id, user.id).await?)
    }

    async fn require_manager(&self, actor: &User, event_id: i64) -> Result<(), EventServiceError> {
        if self.events.find_by_id(event_id).await?.is_none() {
            return Err(EventServiceError::EventNotFound);
        }
        if !self.can_manage(actor, event_id).await? {
            return Err(EventServiceError::NotAdmin);
        }
        Ok(())
    }

    async fn require_user(&self, user_id: i64) -> Result<(), EventServiceError> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(|_| ())
            .ok_or(EventServiceError::UserNotFound)
    }
}

fn viewer_of(user: Option<&User>) -> Viewer {
    match user {
        None => Viewer::Anonymous,
        Some(user) if user.is_staff => Viewer::Staff,
        Some(user) => Viewer::User(user.id),
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Stores dates as UTC RFC 3339 so string comparison orders them.
/// A bare `YYYY-MM-DD` means midnight UTC.
pub fn normalize_date(raw: &str) -> Result<String, EventServiceError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(format_instant(parsed.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| format_instant(naive.and_utc()))
        .ok_or_else(|| EventServiceError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Event;
    use crate::repositories::event_repository::MockEventRepository;
    use crate::repositories::registration_repository::MockRegistrationRepository;
    use crate::repositories::ExportRow;
    use crate::repositories::user_repository::MockUserRepository;
    use mockall::predicate::*;

    fn user(id: i64, is_staff: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.com", id),
            password_hash: String::new(),
            role: "attendee".to_string(),
            phone: None,
            bio: None,
            email_verified: true,
            phone_verified: false,
            is_staff,
            created_at: None,
        }
    }

    fn private_event(id: i64) -> Event {
        Event {
            id,
            name: "Board meeting".to_string(),
            description: String::new(),
            date: "2026-11-01T20:00:00Z".to_string(),
            location: String::new(),
            capacity: 0,
            max_qr_codes: None,
            max_codes_per_user: None,
            is_public: false,
            created_at: None,
        }
    }

    fn service(events: MockEventRepository) -> EventService {
        EventService::new(
            Arc::new(events),
            Arc::new(MockUserRepository::new()),
            Arc::new(MockRegistrationRepository::new()),
        )
    }

    #[test]
    fn dates_normalize_to_utc() {
        assert_eq!(
            normalize_date("2026-11-01T22:00:00+02:00").unwrap(),
            "2026-11-01T20:00:00Z"
        );
        assert_eq!(normalize_date("2026-11-01").unwrap(), "2026-11-01T00:00:00Z");
        assert!(matches!(
            normalize_date("next friday"),
            Err(EventServiceError::InvalidDate(_))
        ));
    }

    #[test]
    fn viewer_reflects_staff_flag() {
        assert_eq!(viewer_of(None), Viewer::Anonymous);
        assert_eq!(viewer_of(Some(&user(3, false))), Viewer::User(3));
        assert_eq!(viewer_of(Some(&user(3, true))), Viewer::Staff);
    }

    #[tokio::test]
    async fn private_event_is_hidden_from_non_admins() {
        let mut events = MockEventRepository::new();
        events
            .expect_find_by_id()
            .with(eq(5))
            .returning(|id| Box::pin(async move { Ok(Some(private_event(id))) }));
        events
            .expect_is_admin()
            .with(eq(5), eq(2))
            .returning(|_, _| Box::pin(async move { Ok(false) }));

        let service = service(events);
        let anonymous = service.get(None, 5).await;
        assert!(matches!(anonymous, Err(EventServiceError::EventNotFound)));

        let outsider = service.get(Some(&user(2, false)), 5).await;
        assert!(matches!(outsider, Err(EventServiceError::EventNotFound)));
    }

    #[tokio::test]
    async fn delete_requires_admin() {
        let mut events = MockEventRepository::new();
        events
            .expect_find_by_id()
            .returning(|id| Box::pin(async move { Ok(Some(private_event(id))) }));
        events
            .expect_is_admin()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        events.expect_delete_event().never();

        let result = service(events).delete(&user(2, false), 5).await;
        assert!(matches!(result, Err(EventServiceError::NotAdmin)));
    }

    #[tokio::test]
    async fn staff_export_quotes_attendee_names() {
        let mut events = MockEventRepository::new();
        events
            .expect_find_by_id()
            .returning(|id| Box::pin(async move { Ok(Some(private_event(id))) }));
        let mut registrations = MockRegistrationRepository::new();
        registrations
            .expect_export_rows()
            .with(eq(5))
            .returning(|_| {
                Box::pin(async move {
                    Ok(vec![ExportRow {
                        id: 9,
                        username: "guest".to_string(),
                        email: "guest@example.com".to_string(),
                        phone: Some("+34 600 000 000".to_string()),
                        attendee_metadata: r#"{"name":"Lee, Ann"}"#.to_string(),
                        used: true,
                        used_at: Some("2026-11-01T20:05:00Z".to_string()),
                        entry_code: "abc".to_string(),
                    }])
                })
            });
        let service = EventService::new(
            Arc::new(events),
            Arc::new(MockUserRepository::new()),
            Arc::new(registrations),
        );

        let bytes = service.export_registrations(&user(1, true), 5).await.unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "id,username,email,phone,attendee,used,used_at,entry_code",
                "9,guest,guest@example.com,+34 600 000 000,\"Lee, Ann\",yes,2026-11-01T20:05:00Z,abc",
            ]
        );
    }

    #[tokio::test]
    async fn export_requires_admin() {
        let mut events = MockEventRepository::new();
        events
            .expect_find_by_id()
            .returning(|id| Box::pin(async move { Ok(Some(private_event(id))) }));
        events
            .expect_is_admin()
            .returning(|_, _| Box::pin(async move { Ok(false) }));

        let result = service(events).export_registrations(&user(2, false), 5).await;
        assert!(matches!(result, Err(EventServiceError::NotAdmin)));
    }

    #[tokio::test]
    async fn create_rejects_bad_limits() {
        let service = service(MockEventRepository::new());
        let request = CreateEventRequest {
            name: "Launch".to_string(),
            description: String::new(),
            date: "2026-11-01".to_string(),
            location: String::new(),
            capacity: 10,
            max_qr_codes: Some(0),
            max_codes_per_user: None,
            is_public: true,
        };

        let result = service.create(&user(1, false), request).await;
        assert!(matches!(
            result,
            Err(EventServiceError::InvalidLimit("max_qr_codes"))
        ));
    }
}
