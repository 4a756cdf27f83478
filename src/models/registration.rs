use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::user::UserSummary;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub entry_code: String,
    pub used: bool,
    pub used_at: Option<String>,
    pub attendee_metadata: String,
    pub created_at: Option<String>,
}

impl Registration {
    pub fn metadata(&self) -> Value {
        serde_json::from_str(&self.attendee_metadata).unwrap_or(Value::Null)
    }

    /// Name shown to door staff: `attendee_metadata.name`, else the account name.
    pub fn holder_identity(&self, username: &str) -> String {
        attendee_name(&self.attendee_metadata, username)
    }
}

/// `name` from raw attendee metadata JSON, falling back to `username`.
pub fn attendee_name(attendee_metadata: &str, username: &str) -> String {
    serde_json::from_str::<Value>(attendee_metadata)
        .ok()
        .as_ref()
        .and_then(|metadata| metadata.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| username.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationView {
    pub id: i64,
    pub event: i64,
    pub user: UserSummary,
    pub entry_code: String,
    pub used: bool,
    pub used_at: Option<String>,
    pub attendee_metadata: Value,
}

impl RegistrationView {
    pub fn new(registration: Registration, user: UserSummary) -> Self {
        let attendee_metadata = registration.metadata();
        Self {
            id: registration.id,
            event: registration.event_id,
            user,
            entry_code: registration.entry_code,
            used: registration.used,
            used_at: registration.used_at,
            attendee_metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRegistrationRequest {
    pub event: i64,
    #[serde(default)]
    pub attendee_metadata: Option<Value>,
}

/// Body of `POST /registrations/validate_qr/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryValidationRequest {
    #[serde(default)]
    pub qr_content: Option<String>,
    #[serde(default)]
    pub event_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(metadata: &str) -> Registration {
        Registration {
            id: 7,
            event_id: 1,
            user_id: 2,
            entry_code: "5f0c3c4e-8f43-4d7b-9c36-0de0f8b1a2c1".to_string(),
            used: false,
            used_at: None,
            attendee_metadata: metadata.to_string(),
            created_at: None,
        }
    }

    #[test]
    fn holder_identity_prefers_attendee_name() {
        let reg = registration(r#"{"name": "Ana Torres"}"#);
        assert_eq!(reg.holder_identity("ana"), "Ana Torres");
    }

    #[test]
    fn holder_identity_falls_back_to_username() {
        assert_eq!(registration("{}").holder_identity("ana"), "ana");
        assert_eq!(registration(r#"{"name": "  "}"#).holder_identity("ana"), "ana");
        assert_eq!(registration("not json").holder_identity("ana"), "ana");
    }
}
