use crate::error::AppError;
use crate::models::user::{RegisterUserRequest, UpdateProfileRequest, User};
use crate::repositories::user_repository::{NewUser, UserRepository};
use crate::repositories::RepositoryError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Username must be 3-150 characters of letters, digits and @.+-_")]
    InvalidUsername,
    #[error("Password too weak (minimum 8 characters)")]
    WeakPassword,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("User not found")]
    UserNotFound,
    #[error("Username already in use")]
    UsernameTaken,
    #[error("Email already registered")]
    EmailTaken,
    #[error("You cannot edit another user's profile")]
    NotOwner,
    #[error("Password hashing failed: {0}")]
    HashingError(String),
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

impl From<UserServiceError> for AppError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::InvalidEmail | UserServiceError::EmailTaken => {
                AppError::validation("email", err.to_string())
            }
            UserServiceError::InvalidUsername | UserServiceError::UsernameTaken => {
                AppError::validation("username", err.to_string())
            }
            UserServiceError::WeakPassword | UserServiceError::PasswordMismatch => {
                AppError::validation("password", err.to_string())
            }
            UserServiceError::UserNotFound => AppError::NotFound("User"),
            UserServiceError::NotOwner => AppError::forbidden(err.to_string()),
            UserServiceError::HashingError(msg) => AppError::Internal(msg),
            UserServiceError::RepositoryError(e) => e.into(),
        }
    }
}

pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub password_confirm: Option<String>,
    pub email_verified: bool,
}

impl From<RegisterUserRequest> for CreateUserRequest {
    fn from(request: RegisterUserRequest) -> Self {
        Self {
            username: request.username,
            email: request.email,
            phone: request.phone.filter(|p| !p.trim().is_empty()),
            password: request.password,
            password_confirm: Some(request.password_confirm),
            email_verified: false,
        }
    }
}

pub struct UpdatePasswordRequest {
    pub user_id: i64,
    pub new_password: String,
    pub new_password_confirm: Option<String>,
}

pub struct UserService {
    repository: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, UserServiceError> {
        let username = request.username.trim();
        validate_username(username)?;

        let email = request.email.trim();
        validate_email(email)?;

        // Validate password confirmation if provided
        if let Some(ref confirm) = request.password_confirm {
            if request.password != *confirm {
                return Err(UserServiceError::PasswordMismatch);
            }
        }

        validate_password(&request.password)?;

        if self.repository.find_by_username(username).await?.is_some() {
            return Err(UserServiceError::UsernameTaken);
        }
        if self.repository.find_by_email(email).await?.is_some() {
            return Err(UserServiceError::EmailTaken);
        }

        let password_hash = hash_password(&request.password)?;

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            phone: request.phone,
            email_verified: request.email_verified,
        };

        match self.repository.create_user(new_user).await {
            Ok(user) => {
                tracing::info!("Created user {} ({})", user.username, user.id);
                Ok(user)
            }
            // Lost a race against a concurrent signup
            Err(RepositoryError::AlreadyExists(_)) => Err(UserServiceError::UsernameTaken),
            Err(e) => Err(UserServiceError::RepositoryError(e)),
        }
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, UserServiceError> {
        Ok(self.repository.find_by_username(username).await?)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(UserServiceError::UserNotFound)
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>, UserServiceError> {
        Ok(self.repository.list_users(limit, offset).await?)
    }

    pub async fn verify_user_email(&self, id: i64) -> Result<(), UserServiceError> {
        match self.repository.verify_email(id).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound(_)) => Err(UserServiceError::UserNotFound),
            Err(e) => Err(UserServiceError::RepositoryError(e)),
        }
    }

    pub async fn set_staff(&self, id: i64, is_staff: bool) -> Result<(), UserServiceError> {
        match self.repository.set_staff(id, is_staff).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound(_)) => Err(UserServiceError::UserNotFound),
            Err(e) => Err(UserServiceError::RepositoryError(e)),
        }
    }

    /// Applies a partial profile update. Only the owner or staff may edit.
    pub async fn update_profile(
        &self,
        actor: &User,
        target_id: i64,
        request: UpdateProfileRequest,
    ) -> Result<User, UserServiceError> {
        if actor.id != target_id && !actor.is_staff {
            return Err(UserServiceError::NotOwner);
        }

        let current = self.get_user(target_id).await?;

        let email = match request.email {
            Some(email) => {
                let email = email.trim().to_string();
                validate_email(&email)?;
                if let Some(existing) = self.repository.find_by_email(&email).await? {
                    if existing.id != target_id {
                        return Err(UserServiceError::EmailTaken);
                    }
                }
                email
            }
            None => current.email.clone(),
        };
        let phone = request.phone.or(current.phone);
        let bio = request.bio.or(current.bio);

        match self
            .repository
            .update_profile(target_id, &email, phone, bio)
            .await
        {
            Ok(()) => self.get_user(target_id).await,
            Err(RepositoryError::AlreadyExists(_)) => Err(UserServiceError::EmailTaken),
            Err(RepositoryError::NotFound(_)) => Err(UserServiceError::UserNotFound),
            Err(e) => Err(UserServiceError::RepositoryError(e)),
        }
    }

    pub async fn update_password(
        &self,
        request: UpdatePasswordRequest,
    ) -> Result<(), UserServiceError> {
        // Validate password confirmation if provided
        if let Some(ref confirm) = request.new_password_confirm {
            if request.new_password != *confirm {
                return Err(UserServiceError::PasswordMismatch);
            }
        }

        validate_password(&request.new_password)?;

        let password_hash = hash_password(&request.new_password)?;

        match self
            .repository
            .update_password(request.user_id, &password_hash)
            .await
        {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound(_)) => Err(UserServiceError::UserNotFound),
            Err(e) => Err(UserServiceError::RepositoryError(e)),
        }
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if username.len() < 3 || username.len() > 150 || !valid_chars {
        return Err(UserServiceError::InvalidUsername);
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if !email.contains('@') || email.len() > 255 || email.is_empty() {
        return Err(UserServiceError::InvalidEmail);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), UserServiceError> {
    if password.len() < 8 {
        return Err(UserServiceError::WeakPassword);
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, UserServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserServiceError::HashingError(e.to_string()))
}
