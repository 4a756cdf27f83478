pub mod auth_service;
pub mod email_service;
pub mod entry_validation;
pub mod event_service;
pub mod registration_service;
pub mod sms_service;
pub mod token_service;
pub mod user_service;
pub mod verification_service;

pub use auth_service::{AuthService, AuthServiceError, LoginRequest};
pub use email_service::{create_email_service, EmailError, EmailService, Ticket};
pub use entry_validation::{EntryValidationError, EntryValidationService};
pub use event_service::{EventListQuery, EventService, EventServiceError};
pub use registration_service::{RegistrationService, RegistrationServiceError};
pub use sms_service::{ConsoleSmsService, SmsError, SmsService};
pub use token_service::{TokenError, TokenService};
pub use user_service::{CreateUserRequest, UpdatePasswordRequest, UserService, UserServiceError};
pub use verification_service::{Channel, IssuedCode, VerificationError, VerificationService};
