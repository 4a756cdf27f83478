use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{RegisterUserRequest, UpdateProfileRequest, UserProfile};
use crate::services::{Channel, CreateUserRequest};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    #[serde(default)]
    pub code: String,
}

/// `POST /api/users/register/`. A verification code is mailed right away.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let user = state
        .user_service
        .create_user(CreateUserRequest::from(request))
        .await?;

    if let Err(e) = state.verification_service.send_code(&user, Channel::Email).await {
        tracing::warn!("Could not send verification code to user {}: {}", user.id, e);
    }

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(user.into())
}

pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserProfile>> {
    let user = state.user_service.get_user(id).await?;
    Ok(Json(user.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    let user = state.user_service.update_profile(&actor, id, request).await?;
    Ok(Json(user.into()))
}

/// Staff only.
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiQuery(page): ApiQuery<Pagination>,
) -> Result<Json<Vec<UserProfile>>> {
    if !actor.is_staff {
        return Err(AppError::forbidden("Only staff can list users"));
    }

    let users = state
        .user_service
        .list_users(page.limit.clamp(1, 500), page.offset.max(0))
        .await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

pub async fn send_email_verification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    let issued = state
        .verification_service
        .send_code(&user, Channel::Email)
        .await?;
    Ok(Json(json!({
        "detail": "Verification code sent",
        "expires_at": issued.expires_at,
    })))
}

pub async fn verify_email(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<VerifyCodeRequest>,
) -> Result<Json<Value>> {
    state
        .verification_service
        .verify(user.id, Channel::Email, &request.code)
        .await?;
    Ok(Json(json!({ "detail": "Email verified", "email_verified": true })))
}

/// No SMS gateway is wired in, so outside production the code is echoed
/// back as `dev_code`.
pub async fn send_phone_verification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    let issued = state
        .verification_service
        .send_code(&user, Channel::Phone)
        .await?;
    let dev_code = (!state.config.is_production()).then_some(issued.code);
    Ok(Json(json!({
        "detail": "Verification code sent by SMS",
        "expires_at": issued.expires_at,
        "dev_code": dev_code,
    })))
}

pub async fn verify_phone(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(request): ApiJson<VerifyCodeRequest>,
) -> Result<Json<Value>> {
    state
        .verification_service
        .verify(user.id, Channel::Phone, &request.code)
        .await?;
    Ok(Json(json!({ "detail": "Phone verified", "phone_verified": true })))
}
