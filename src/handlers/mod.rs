pub mod event_handlers;
pub mod extract;
pub mod registration_handlers;
pub mod token_handlers;
pub mod user_handlers;

pub use event_handlers::*;
pub use registration_handlers::*;
pub use token_handlers::*;
pub use user_handlers::*;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
