use crate::error::AppError;
use crate::models::{CreateRegistrationRequest, Event, Registration, RegistrationView, User};
use crate::repositories::{
    EventRepository, NewRegistration, RegistrationLimits, RegistrationRepository, RepositoryError,
    ResolvedEntry,
};
use crate::services::email_service::{EmailService, Ticket};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

// Entry codes are random v4 UUIDs; a collision is retried this many times.
const MAX_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationServiceError {
    #[error("Event not found")]
    EventNotFound,
    #[error("Registration not found")]
    RegistrationNotFound,
    #[error("attendee_metadata must be a JSON object")]
    InvalidMetadata,
    #[error("You have reached the maximum of {0} registration(s) for this event")]
    PerUserLimitReached(i64),
    #[error("This event has no registrations left")]
    EventFull,
    #[error("Could not allocate a unique entry code")]
    CodeExhausted,
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

impl From<RegistrationServiceError> for AppError {
    fn from(err: RegistrationServiceError) -> Self {
        match err {
            RegistrationServiceError::EventNotFound => AppError::NotFound("Event"),
            RegistrationServiceError::RegistrationNotFound => AppError::NotFound("Registration"),
            RegistrationServiceError::InvalidMetadata => {
                AppError::validation("attendee_metadata", err.to_string())
            }
            RegistrationServiceError::PerUserLimitReached(_)
            | RegistrationServiceError::EventFull => AppError::LimitReached(err.to_string()),
            RegistrationServiceError::CodeExhausted => AppError::Internal(err.to_string()),
            RegistrationServiceError::RepositoryError(e) => e.into(),
        }
    }
}

pub struct RegistrationService {
    registrations: Arc<dyn RegistrationRepository>,
    events: Arc<dyn EventRepository>,
    email_service: Arc<dyn EmailService>,
}

impl RegistrationService {
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        events: Arc<dyn EventRepository>,
        email_service: Arc<dyn EmailService>,
    ) -> Self {
        Self {
            registrations,
            events,
            email_service,
        }
    }

    /// Registers `user` for an event. Limits are enforced by the insert itself,
    /// so concurrent requests cannot overshoot them.
    pub async fn create(
        &self,
        user: &User,
        request: CreateRegistrationRequest,
    ) -> Result<RegistrationView, RegistrationServiceError> {
        let event = self
            .events
            .find_by_id(request.event)
            .await?
            .ok_or(RegistrationServiceError::EventNotFound)?;

        if !event.is_public && !self.can_manage(user, event.id).await? {
            return Err(RegistrationServiceError::EventNotFound);
        }

        let attendee_metadata = match request.attendee_metadata {
            None | Some(Value::Null) => "{}".to_string(),
            Some(value @ Value::Object(_)) => value.to_string(),
            Some(_) => return Err(RegistrationServiceError::InvalidMetadata),
        };

        let limits = RegistrationLimits {
            total: event.total_limit(),
            per_user: event.max_codes_per_user,
        };

        let registration = self
            .insert_with_fresh_code(&event, user, attendee_metadata, limits)
            .await?;

        tracing::info!(
            "User {} registered for event {} (registration {})",
            user.id,
            event.id,
            registration.id
        );

        self.send_ticket(user, &event, &registration).await;

        Ok(RegistrationView::new(registration, user.into()))
    }

    pub async fn list(&self, user: &User) -> Result<Vec<RegistrationView>, RegistrationServiceError> {
        let entries = if user.is_staff {
            self.registrations.list_all().await?
        } else {
            self.registrations.list_for_user(user.id).await?
        };

        Ok(entries.into_iter().map(into_view).collect())
    }

    pub async fn get(
        &self,
        user: &User,
        registration_id: i64,
    ) -> Result<RegistrationView, RegistrationServiceError> {
        let entry = self.visible_entry(user, registration_id).await?;
        Ok(into_view(entry))
    }

    pub async fn delete(
        &self,
        user: &User,
        registration_id: i64,
    ) -> Result<(), RegistrationServiceError> {
        self.visible_entry(user, registration_id).await?;
        self.registrations
            .delete_registration(registration_id)
            .await?;
        tracing::info!("User {} deleted registration {}", user.id, registration_id);
        Ok(())
    }

    async fn insert_with_fresh_code(
        &self,
        event: &Event,
        user: &User,
        attendee_metadata: String,
        limits: RegistrationLimits,
    ) -> Result<Registration, RegistrationServiceError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let new_registration = NewRegistration {
                event_id: event.id,
                user_id: user.id,
                entry_code: Uuid::new_v4().to_string(),
                attendee_metadata: attendee_metadata.clone(),
            };

            match self
                .registrations
                .create_within_limits(new_registration, limits)
                .await
            {
                Ok(Some(registration)) => return Ok(registration),
                Ok(None) => return Err(self.limit_error(event, user, limits).await?),
                Err(RepositoryError::AlreadyExists(_)) => {
                    tracing::warn!("Entry code collision for event {}, retrying", event.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistrationServiceError::CodeExhausted)
    }

    /// Works out which limit blocked an insert, for the error message.
    async fn limit_error(
        &self,
        event: &Event,
        user: &User,
        limits: RegistrationLimits,
    ) -> Result<RegistrationServiceError, RegistrationServiceError> {
        if let Some(per_user) = limits.per_user {
            let held = self.registrations.count_for_user(event.id, user.id).await?;
            if held >= per_user {
                return Ok(RegistrationServiceError::PerUserLimitReached(per_user));
            }
        }
        Ok(RegistrationServiceError::EventFull)
    }

    async fn send_ticket(&self, user: &User, event: &Event, registration: &Registration) {
        let ticket = Ticket {
            attendee: registration.holder_identity(&user.username),
            event_name: event.name.clone(),
            event_date: event.date.clone(),
            location: event.location.clone(),
            entry_code: registration.entry_code.clone(),
        };

        let error_text = match self.email_service.send_ticket(&user.email, &ticket).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "Ticket email for registration {} failed: {}",
                    registration.id,
                    e
                );
                Some(e.to_string())
            }
        };

        if let Err(e) = self
            .registrations
            .log_email(registration.id, &user.email, &ticket.subject(), error_text)
            .await
        {
            tracing::error!("Failed to record email log: {}", e);
        }
    }

    async fn visible_entry(
        &self,
        user: &User,
        registration_id: i64,
    ) -> Result<ResolvedEntry, RegistrationServiceError> {
        let entry = self
            .registrations
            .resolve_by_id(registration_id)
            .await?
            .ok_or(RegistrationServiceError::RegistrationNotFound)?;

        if entry.registration.user_id == user.id
            || self.can_manage(user, entry.registration.event_id).await?
        {
            Ok(entry)
        } else {
            Err(RegistrationServiceError::RegistrationNotFound)
        }
    }

    async fn can_manage(&self, user: &User, event_id: i64) -> Result<bool, RegistrationServiceError> {
        if user.is_staff {
            return Ok(true);
        }
        Ok(self.events.is_admin(event_id, user.id).await?)
    }
}

fn into_view(entry: ResolvedEntry) -> RegistrationView {
    RegistrationView::new(entry.registration, entry.holder)
}
