use crate::{error::AppError, models::User, AppState};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;

/// Authenticated caller, attached to the request by [`authenticate`].
/// Extracting it from an anonymous request yields 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for AuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthUser>().cloned())
    }
}

/// Paths an unverified account may still use.
const UNVERIFIED_ALLOWED_PREFIXES: &[&str] = &[
    "/api/token/",
    "/api/users/register/",
    "/api/users/me/",
    "/api/users/send-email-verification/",
    "/api/users/verify-email/",
    "/health",
];

fn extract_bearer_token(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_header = value.to_str().map_err(|_| AppError::TokenNotValid)?;
    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        _ => Err(AppError::TokenNotValid),
    }
}

/// Resolves an optional bearer token to a user. A present but invalid
/// token is rejected outright so clients know to refresh.
pub async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = extract_bearer_token(&headers)? {
        let user_id = state.token_service.validate_access(&token).await?;
        let user = state
            .user_service
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::TokenNotValid)?;
        request.extensions_mut().insert(AuthUser(user));
    }

    Ok(next.run(request).await)
}

/// Every authenticated account must verify its email before using the API.
pub async fn require_verified_email(request: Request, next: Next) -> Result<Response, AppError> {
    if let Some(AuthUser(user)) = request.extensions().get::<AuthUser>() {
        let path = request.uri().path();
        let allowed = UNVERIFIED_ALLOWED_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix));
        if !user.email_verified && !allowed {
            tracing::debug!("Blocked unverified user {} on {}", user.id, path);
            return Err(AppError::EmailNotVerified);
        }
    }
    Ok(next.run(request).await)
}
