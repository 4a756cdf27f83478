//! Check-and-set of entry codes at the door.
//!
//! A code is resolved to its registration, the caller's right to admit
//! people to that event is checked, and the registration is flipped from
//! unused to used by one conditional update. Whoever loses a race on the
//! same code sees `AlreadyUsed` with the winner's timestamp.

use crate::error::AppError;
use crate::models::{DenialReason, EntryDetails, EntryOutcome, RegistrationView, User};
use crate::repositories::{EventRepository, RegistrationRepository, RepositoryError, ResolvedEntry};
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EntryValidationError {
    #[error("qr_content is required")]
    MissingPayload,
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

impl From<EntryValidationError> for AppError {
    fn from(err: EntryValidationError) -> Self {
        match err {
            EntryValidationError::MissingPayload => {
                AppError::validation("qr_content", err.to_string())
            }
            EntryValidationError::RepositoryError(e) => e.into(),
        }
    }
}

pub struct EntryValidationService {
    registrations: Arc<dyn RegistrationRepository>,
    events: Arc<dyn EventRepository>,
}

impl EntryValidationService {
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            registrations,
            events,
        }
    }

    /// Validates a scanned payload, optionally scoped to one event.
    pub async fn validate(
        &self,
        actor: &User,
        payload: &str,
        event_id: Option<i64>,
    ) -> Result<EntryOutcome, EntryValidationError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(EntryValidationError::MissingPayload);
        }

        let entry = match self.resolve_payload(payload).await? {
            Some(entry) => entry,
            None => {
                tracing::info!("Entry code not found (scanned by user {})", actor.id);
                return Ok(EntryOutcome::Denied(DenialReason::NotFound));
            }
        };

        if event_id.is_some_and(|id| id != entry.registration.event_id) {
            tracing::info!(
                "Entry code for event {} presented at event {:?}",
                entry.registration.event_id,
                event_id
            );
            return Ok(EntryOutcome::Denied(DenialReason::NotFound));
        }

        self.check_and_set(actor, entry).await
    }

    /// Same check-and-set for a registration addressed by id.
    pub async fn validate_registration(
        &self,
        actor: &User,
        registration_id: i64,
    ) -> Result<EntryOutcome, EntryValidationError> {
        match self.registrations.resolve_by_id(registration_id).await? {
            Some(entry) => self.check_and_set(actor, entry).await,
            None => Ok(EntryOutcome::Denied(DenialReason::NotFound)),
        }
    }

    async fn resolve_payload(
        &self,
        payload: &str,
    ) -> Result<Option<ResolvedEntry>, EntryValidationError> {
        if let Some(entry) = self.registrations.resolve_by_code(payload).await? {
            return Ok(Some(entry));
        }

        match canonical_code(payload) {
            Some(code) if code != payload => Ok(self.registrations.resolve_by_code(&code).await?),
            _ => Ok(None),
        }
    }

    async fn check_and_set(
        &self,
        actor: &User,
        entry: ResolvedEntry,
    ) -> Result<EntryOutcome, EntryValidationError> {
        let event_id = entry.registration.event_id;
        if !actor.is_staff && !self.events.is_admin(event_id, actor.id).await? {
            tracing::warn!(
                "User {} tried to validate an entry for event {} without permission",
                actor.id,
                event_id
            );
            return Ok(EntryOutcome::Denied(DenialReason::Forbidden));
        }

        if entry.registration.used {
            return Ok(EntryOutcome::AlreadyUsed(details(entry)));
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let registration_id = entry.registration.id;

        if self.registrations.mark_used(registration_id, &now).await? {
            tracing::info!(
                "Registration {} admitted to event {} by user {}",
                registration_id,
                event_id,
                actor.id
            );
            let mut entry = entry;
            entry.registration.used = true;
            entry.registration.used_at = Some(now);
            return Ok(EntryOutcome::Accepted(details(entry)));
        }

        // Another scan flipped it first; report its timestamp
        tracing::info!("Registration {} was admitted concurrently", registration_id);
        match self.registrations.resolve_by_id(registration_id).await? {
            Some(current) => Ok(EntryOutcome::AlreadyUsed(details(current))),
            None => Ok(EntryOutcome::Denied(DenialReason::NotFound)),
        }
    }
}

fn details(entry: ResolvedEntry) -> EntryDetails {
    let holder = entry.registration.holder_identity(&entry.holder.username);
    let used_at = entry.registration.used_at.clone().unwrap_or_default();
    EntryDetails {
        holder,
        event_name: entry.event_name,
        used_at,
        registration: RegistrationView::new(entry.registration, entry.holder),
    }
}

/// Stored form of a scanned code: lowercase hyphenated UUID. Scanners may
/// encode a URL ending in the code, in which case the last path segment is used.
fn canonical_code(payload: &str) -> Option<String> {
    let candidate = if payload.contains('/') {
        let path = payload.split(['?', '#']).next().unwrap_or(payload);
        path.rsplit('/').find(|segment| !segment.is_empty())?
    } else {
        payload
    };
    Uuid::parse_str(candidate).ok().map(|code| code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Registration, UserSummary};
    use crate::repositories::event_repository::MockEventRepository;
    use crate::repositories::registration_repository::MockRegistrationRepository;
    use mockall::predicate::*;

    const CODE: &str = "5f0c3c4e-8f43-4d7b-9c36-0de0f8b1a2c1";
    const UPPER_CODE: &str = "5F0C3C4E-8F43-4D7B-9C36-0DE0F8B1A2C1";

    fn staff() -> User {
        User {
            id: 1,
            username: "door".to_string(),
            email: "door@example.com".to_string(),
            password_hash: String::new(),
            role: "admin".to_string(),
            phone: None,
            bio: None,
            email_verified: true,
            phone_verified: false,
            is_staff: true,
            created_at: None,
        }
    }

    fn attendee_user(id: i64) -> User {
        User {
            is_staff: false,
            role: "attendee".to_string(),
            id,
            ..staff()
        }
    }

    fn entry(used_at: Option<&str>) -> ResolvedEntry {
        ResolvedEntry {
            registration: Registration {
                id: 7,
                event_id: 3,
                user_id: 2,
                entry_code: CODE.to_string(),
                used: used_at.is_some(),
                used_at: used_at.map(str::to_string),
                attendee_metadata: r#"{"name": "Ana Torres"}"#.to_string(),
                created_at: None,
            },
            holder: UserSummary {
                id: 2,
                username: "ana".to_string(),
                email: "ana@example.com".to_string(),
                role: "attendee".to_string(),
            },
            event_name: "Launch".to_string(),
        }
    }

    fn found(used_at: Option<&'static str>) -> MockRegistrationRepository {
        let mut registrations = MockRegistrationRepository::new();
        registrations
            .expect_resolve_by_code()
            .with(eq(CODE))
            .returning(move |_| Box::pin(async move { Ok(Some(entry(used_at))) }));
        registrations
    }

    fn service(registrations: MockRegistrationRepository) -> EntryValidationService {
        EntryValidationService::new(Arc::new(registrations), Arc::new(MockEventRepository::new()))
    }

    #[test]
    fn payloads_reduce_to_the_stored_code() {
        assert_eq!(
            canonical_code(&format!("https://evento.app/r/{}/", CODE)).as_deref(),
            Some(CODE)
        );
        assert_eq!(
            canonical_code(&format!("https://evento.app/r/{}?src=qr", CODE.to_uppercase()))
                .as_deref(),
            Some(CODE)
        );
        assert_eq!(canonical_code(UPPER_CODE).as_deref(), Some(CODE));
        assert_eq!(canonical_code(CODE).as_deref(), Some(CODE));
        assert_eq!(canonical_code("https://evento.app/r/not-a-code"), None);
        assert_eq!(canonical_code("garbage"), None);
    }

    #[tokio::test]
    async fn uppercase_bare_code_is_accepted() {
        let mut registrations = MockRegistrationRepository::new();
        registrations
            .expect_resolve_by_code()
            .with(eq(UPPER_CODE))
            .times(1)
            .returning(|_| Box::pin(async move { Ok(None) }));
        registrations
            .expect_resolve_by_code()
            .with(eq(CODE))
            .times(1)
            .returning(|_| Box::pin(async move { Ok(Some(entry(None))) }));
        registrations
            .expect_mark_used()
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(true) }));

        let outcome = service(registrations)
            .validate(&staff(), UPPER_CODE, None)
            .await
            .unwrap();
        assert!(matches!(outcome, EntryOutcome::Accepted(_)));
    }

    #[tokio::test]
    async fn fresh_code_is_accepted() {
        let mut registrations = found(None);
        registrations
            .expect_mark_used()
            .withf(|id, _| *id == 7)
            .times(1)
            .returning(|_, _| Box::pin(async move { Ok(true) }));

        let outcome = service(registrations)
            .validate(&staff(), &format!("  {}\n", CODE), Some(3))
            .await
            .unwrap();

        match outcome {
            EntryOutcome::Accepted(details) => {
                assert_eq!(details.holder, "Ana Torres");
                assert_eq!(details.event_name, "Launch");
                assert!(details.registration.used);
                assert_eq!(details.registration.used_at.as_deref(), Some(details.used_at.as_str()));
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn used_code_is_reported_without_writing() {
        let mut registrations = found(Some("2026-11-01T20:03:11.000Z"));
        registrations.expect_mark_used().never();

        let outcome = service(registrations)
            .validate(&staff(), CODE, None)
            .await
            .unwrap();

        match outcome {
            EntryOutcome::AlreadyUsed(details) => {
                assert_eq!(details.used_at, "2026-11-01T20:03:11.000Z")
            }
            other => panic!("expected AlreadyUsed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn losing_the_race_reports_the_winning_timestamp() {
        let mut registrations = found(None);
        registrations
            .expect_mark_used()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        registrations
            .expect_resolve_by_id()
            .with(eq(7))
            .times(1)
            .returning(|_| {
                Box::pin(async move { Ok(Some(entry(Some("2026-11-01T20:03:11.000Z")))) })
            });

        let outcome = service(registrations)
            .validate(&staff(), CODE, None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            EntryOutcome::AlreadyUsed(ref details) if details.used_at == "2026-11-01T20:03:11.000Z"
        ));
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let mut registrations = MockRegistrationRepository::new();
        registrations
            .expect_resolve_by_code()
            .returning(|_| Box::pin(async move { Ok(None) }));

        let outcome = service(registrations)
            .validate(&staff(), "garbage", None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Denied(DenialReason::NotFound));
    }

    #[tokio::test]
    async fn code_for_another_event_is_not_found() {
        let mut registrations = found(None);
        registrations.expect_mark_used().never();

        let outcome = service(registrations)
            .validate(&staff(), CODE, Some(99))
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Denied(DenialReason::NotFound));
    }

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let mut registrations = found(None);
        registrations.expect_mark_used().never();
        let mut events = MockEventRepository::new();
        events
            .expect_is_admin()
            .with(eq(3), eq(2))
            .returning(|_, _| Box::pin(async move { Ok(false) }));

        let service = EntryValidationService::new(Arc::new(registrations), Arc::new(events));
        let outcome = service
            .validate(&attendee_user(2), CODE, None)
            .await
            .unwrap();
        assert_eq!(outcome, EntryOutcome::Denied(DenialReason::Forbidden));
    }

    #[tokio::test]
    async fn empty_payload_is_an_error() {
        let result = service(MockRegistrationRepository::new())
            .validate(&staff(), "   ", None)
            .await;
        assert!(matches!(result, Err(EntryValidationError::MissingPayload)));
    }
}
