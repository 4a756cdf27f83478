use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{CreateEventRequest, EventView, UserSummary};
use crate::services::EventListQuery;
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct EventUserRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
}

impl EventUserRequest {
    fn user_id(&self) -> Result<i64> {
        self.user_id
            .ok_or_else(|| AppError::validation("user_id", "user_id is required"))
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    ApiQuery(query): ApiQuery<EventListQuery>,
) -> Result<Json<Vec<EventView>>> {
    let viewer = viewer.map(|AuthUser(user)| user);
    let events = state.event_service.list(viewer.as_ref(), query).await?;
    Ok(Json(events))
}

pub async fn create_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventView>)> {
    let event = state.event_service.create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<EventView>> {
    let viewer = viewer.map(|AuthUser(user)| user);
    let event = state.event_service.get(viewer.as_ref(), id).await?;
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode> {
    state.event_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_admin(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<EventUserRequest>,
) -> Result<Json<Value>> {
    state
        .event_service
        .add_admin(&user, id, request.user_id()?)
        .await?;
    Ok(Json(json!({ "detail": "admin added" })))
}

pub async fn remove_admin(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<EventUserRequest>,
) -> Result<Json<Value>> {
    state
        .event_service
        .remove_admin(&user, id, request.user_id()?)
        .await?;
    Ok(Json(json!({ "detail": "admin removed" })))
}

pub async fn participants(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<UserSummary>>> {
    let participants = state.event_service.participants(&user, id).await?;
    Ok(Json(participants))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<EventUserRequest>,
) -> Result<Json<Value>> {
    let removed = state
        .event_service
        .remove_participant(&user, id, request.user_id()?)
        .await?;
    Ok(Json(
        json!({ "detail": format!("{} registration(s) removed", removed) }),
    ))
}

/// `GET /api/events/{id}/export_registrations/`
pub async fn export_registrations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Response> {
    let csv = state.event_service.export_registrations(&user, id).await?;
    let disposition = format!("attachment; filename=\"registrations_{}.csv\"", id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}
