//! HTTP client for the Evento API, used by the CLI and by front ends.

pub mod api;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod scanner;

pub use api::{ApiClient, ApiRequest, ApiResponse, ClientConfig, SessionEvents};
pub use credentials::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};
pub use error::ClientError;
pub use refresh::{GatePhase, RefreshFailed, RefreshGate};
pub use scanner::{EntryScanner, ScanError, ScanPolicy};
