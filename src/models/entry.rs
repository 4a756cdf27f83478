use serde::{de::Error as _, Deserialize, Serialize};

use super::registration::RegistrationView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotFound,
    Forbidden,
}

impl DenialReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenialReason::NotFound => "Invalid entry code",
            DenialReason::Forbidden => "You do not have permission to validate entries for this event",
        }
    }
}

/// What door staff see for an admitted (or previously admitted) code.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDetails {
    pub holder: String,
    pub event_name: String,
    pub used_at: String,
    pub registration: RegistrationView,
}

/// Result of presenting an entry code. Denials are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Accepted(EntryDetails),
    AlreadyUsed(EntryDetails),
    Denied(DenialReason),
}

impl EntryOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            EntryOutcome::Accepted(_) | EntryOutcome::AlreadyUsed(_) => 200,
            EntryOutcome::Denied(DenialReason::NotFound) => 404,
            EntryOutcome::Denied(DenialReason::Forbidden) => 403,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Accepted,
    AlreadyUsed,
    Denied,
}

/// JSON body of the validate endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub already_used: bool,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationView>,
}

impl From<&EntryOutcome> for EntryValidationResponse {
    fn from(outcome: &EntryOutcome) -> Self {
        match outcome {
            EntryOutcome::Accepted(details) => {
                Self::admitted(EntryStatus::Accepted, "Entry granted", details)
            }
            EntryOutcome::AlreadyUsed(details) => Self::admitted(
                EntryStatus::AlreadyUsed,
                "This code has already been used",
                details,
            ),
            EntryOutcome::Denied(reason) => Self {
                valid: false,
                already_used: false,
                status: EntryStatus::Denied,
                reason: Some(*reason),
                message: reason.message().to_string(),
                attendee: None,
                event: None,
                used_at: None,
                registration: None,
            },
        }
    }
}

impl EntryValidationResponse {
    fn admitted(status: EntryStatus, message: &str, details: &EntryDetails) -> Self {
        Self {
            valid: status == EntryStatus::Accepted,
            already_used: status == EntryStatus::AlreadyUsed,
            status,
            reason: None,
            message: message.to_string(),
            attendee: Some(details.holder.clone()),
            event: Some(details.event_name.clone()),
            used_at: Some(details.used_at.clone()),
            registration: Some(details.registration.clone()),
        }
    }
}

impl TryFrom<EntryValidationResponse> for EntryOutcome {
    type Error = serde_json::Error;

    fn try_from(body: EntryValidationResponse) -> Result<Self, Self::Error> {
        if body.status == EntryStatus::Denied {
            let reason = body
                .reason
                .ok_or_else(|| serde_json::Error::custom("denied response without reason"))?;
            return Ok(EntryOutcome::Denied(reason));
        }

        let details = match (body.attendee, body.event, body.used_at, body.registration) {
            (Some(holder), Some(event_name), Some(used_at), Some(registration)) => EntryDetails {
                holder,
                event_name,
                used_at,
                registration,
            },
            _ => {
                return Err(serde_json::Error::custom(
                    "admitted response is missing entry details",
                ))
            }
        };

        Ok(match body.status {
            EntryStatus::Accepted => EntryOutcome::Accepted(details),
            _ => EntryOutcome::AlreadyUsed(details),
        })
    }
}
