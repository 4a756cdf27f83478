use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{
    CreateRegistrationRequest, EntryOutcome, EntryValidationRequest, EntryValidationResponse,
    RegistrationView,
};
use super::extract::{ApiJson, ApiPath};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub async fn list_registrations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<RegistrationView>>> {
    let registrations = state.registration_service.list(&user).await?;
    Ok(Json(registrations))
}

pub async fn create_registration(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationView>)> {
    let registration = state.registration_service.create(&user, request).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn get_registration(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<RegistrationView>> {
    let registration = state.registration_service.get(&user, id).await?;
    Ok(Json(registration))
}

pub async fn delete_registration(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode> {
    state.registration_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/registrations/validate_qr/`
pub async fn validate_qr(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<EntryValidationRequest>,
) -> Result<Response> {
    let payload = request
        .qr_content
        .ok_or_else(|| AppError::validation("qr_content", "qr_content is required"))?;

    let outcome = state
        .entry_validation
        .validate(&user, &payload, request.event_id)
        .await?;

    Ok(outcome_response(&outcome))
}

/// `POST /api/registrations/{id}/validate_qr/`
pub async fn validate_registration(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Response> {
    let outcome = state
        .entry_validation
        .validate_registration(&user, id)
        .await?;

    Ok(outcome_response(&outcome))
}

fn outcome_response(outcome: &EntryOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.http_status()).unwrap_or(StatusCode::OK);
    (status, Json(EntryValidationResponse::from(outcome))).into_response()
}
