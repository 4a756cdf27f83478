pub mod auth_token;
pub mod entry;
pub mod event;
pub mod registration;
pub mod user;

pub use auth_token::{AccessTokenResponse, AuthToken, TokenKind, TokenPair};
pub use entry::{
    DenialReason, EntryDetails, EntryOutcome, EntryStatus, EntryValidationResponse,
};
pub use event::{CreateEventRequest, Event, EventView};
pub use registration::{
    CreateRegistrationRequest, EntryValidationRequest, Registration, RegistrationView,
};
pub use user::{RegisterUserRequest, Role, UpdateProfileRequest, User, UserProfile, UserSummary};
