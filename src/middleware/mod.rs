pub mod auth;

pub use auth::{authenticate, require_verified_email, AuthUser};
