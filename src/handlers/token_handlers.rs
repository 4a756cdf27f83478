use crate::error::Result;
use crate::models::{AccessTokenResponse, TokenPair};
use crate::services::LoginRequest;
use super::extract::ApiJson;
use crate::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokenObtainRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh: String,
}

/// `POST /api/token/`
pub async fn obtain_token(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TokenObtainRequest>,
) -> Result<Json<TokenPair>> {
    let user = state
        .auth_service
        .authenticate(LoginRequest {
            username: request.username,
            password: request.password,
        })
        .await?;

    let pair = state.token_service.issue_pair(user.id).await?;
    tracing::info!("Issued token pair for user {}", user.id);

    Ok(Json(pair))
}

/// `POST /api/token/refresh/`
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TokenRefreshRequest>,
) -> Result<Json<AccessTokenResponse>> {
    let response = state.token_service.refresh_access(&request.refresh).await?;
    Ok(Json(response))
}
