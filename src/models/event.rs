use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::user::UserSummary;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub capacity: i64,
    pub max_qr_codes: Option<i64>,
    pub max_codes_per_user: Option<i64>,
    pub is_public: bool,
    pub created_at: Option<String>,
}

impl Event {
    /// Upper bound on registrations across all users, if any.
    pub fn total_limit(&self) -> Option<i64> {
        let capacity = (self.capacity > 0).then_some(self.capacity);
        match (capacity, self.max_qr_codes) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventView {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub date: String,
    pub location: String,
    pub capacity: i64,
    pub max_qr_codes: Option<i64>,
    pub max_codes_per_user: Option<i64>,
    pub is_public: bool,
    pub admins: Vec<UserSummary>,
}

impl EventView {
    pub fn new(event: Event, admins: Vec<UserSummary>) -> Self {
        Self {
            id: event.id,
            name: event.name,
            description: event.description,
            date: event.date,
            location: event.location,
            capacity: event.capacity,
            max_qr_codes: event.max_qr_codes,
            max_codes_per_user: event.max_codes_per_user,
            is_public: event.is_public,
            admins,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub max_qr_codes: Option<i64>,
    #[serde(default)]
    pub max_codes_per_user: Option<i64>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}
