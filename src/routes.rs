use crate::{handlers, middleware, AppState};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Builds the full API router. Paths keep their trailing slash.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Tokens
        .route("/api/token/", post(handlers::obtain_token))
        .route("/api/token/refresh/", post(handlers::refresh_token))
        // Users
        .route("/api/users/", get(handlers::list_users))
        .route("/api/users/register/", post(handlers::register))
        .route("/api/users/me/", get(handlers::me))
        .route(
            "/api/users/send-email-verification/",
            post(handlers::send_email_verification),
        )
        .route("/api/users/verify-email/", post(handlers::verify_email))
        .route(
            "/api/users/send-phone-verification/",
            post(handlers::send_phone_verification),
        )
        .route("/api/users/verify-phone/", post(handlers::verify_phone))
        .route(
            "/api/users/{id}/",
            get(handlers::get_user).patch(handlers::update_user),
        )
        // Events
        .route(
            "/api/events/",
            get(handlers::list_events).post(handlers::create_event),
        )
        .route(
            "/api/events/{id}/",
            get(handlers::get_event).delete(handlers::delete_event),
        )
        .route("/api/events/{id}/add_admin/", post(handlers::add_admin))
        .route("/api/events/{id}/remove_admin/", post(handlers::remove_admin))
        .route("/api/events/{id}/participants/", get(handlers::participants))
        .route(
            "/api/events/{id}/remove_participant/",
            post(handlers::remove_participant),
        )
        .route(
            "/api/events/{id}/export_registrations/",
            get(handlers::export_registrations),
        )
        // Registrations
        .route(
            "/api/registrations/",
            get(handlers::list_registrations).post(handlers::create_registration),
        )
        .route(
            "/api/registrations/validate_qr/",
            post(handlers::validate_qr),
        )
        .route(
            "/api/registrations/{id}/",
            get(handlers::get_registration).delete(handlers::delete_registration),
        )
        .route(
            "/api/registrations/{id}/validate_qr/",
            post(handlers::validate_registration),
        );

    let cors_layer = cors_layer(state.config.cors_allowed_origin.as_deref());

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        // The verification gate runs after authentication has attached the user
        .layer(from_fn(middleware::require_verified_email))
        .layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(3600));

    match allowed_origin.and_then(|origin| HeaderValue::from_str(origin).ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}
