pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use config::AppConfig;
use repositories::{SqliteEventRepository, SqliteRegistrationRepository, SqliteUserRepository};
use services::{
    AuthService, ConsoleSmsService, EmailService, EntryValidationService, EventService,
    RegistrationService, TokenService, UserService, VerificationService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub user_service: Arc<UserService>,
    pub auth_service: Arc<AuthService>,
    pub token_service: Arc<TokenService>,
    pub verification_service: Arc<VerificationService>,
    pub event_service: Arc<EventService>,
    pub registration_service: Arc<RegistrationService>,
    pub entry_validation: Arc<EntryValidationService>,
    pub pool: sqlx::SqlitePool,
}

impl AppState {
    /// Wires the SQLite repositories into every service.
    pub fn new(
        pool: sqlx::SqlitePool,
        config: AppConfig,
        email_service: Arc<dyn EmailService>,
    ) -> Self {
        let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
        let event_repository = Arc::new(SqliteEventRepository::new(pool.clone()));
        let registration_repository = Arc::new(SqliteRegistrationRepository::new(pool.clone()));

        let token_service = Arc::new(TokenService::new(
            pool.clone(),
            config.access_token_lifetime,
            config.refresh_token_lifetime,
        ));

        Self {
            user_service: Arc::new(UserService::new(user_repository.clone())),
            auth_service: Arc::new(AuthService::new(user_repository.clone())),
            token_service,
            verification_service: Arc::new(VerificationService::new(
                pool.clone(),
                email_service.clone(),
                Arc::new(ConsoleSmsService::new()),
                user_repository.clone(),
            )),
            event_service: Arc::new(EventService::new(
                event_repository.clone(),
                user_repository,
                registration_repository.clone(),
            )),
            registration_service: Arc::new(RegistrationService::new(
                registration_repository.clone(),
                event_repository.clone(),
                email_service,
            )),
            entry_validation: Arc::new(EntryValidationService::new(
                registration_repository,
                event_repository,
            )),
            config: Arc::new(config),
            pool,
        }
    }
}
