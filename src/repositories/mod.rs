pub mod event_repository;
pub mod registration_repository;
pub mod user_repository;

pub use event_repository::{
    EventFilter, EventRepository, SqliteEventRepository, Viewer, Visibility,
};
pub use registration_repository::{
    ExportRow, NewRegistration, RegistrationLimits, RegistrationRepository, ResolvedEntry,
    SqliteRegistrationRepository,
};
pub use user_repository::{NewUser, SqliteUserRepository, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
