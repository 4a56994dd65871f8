//! Storage backend authorization.
//!
//! A [`Credential`] is persisted in a small JSON file at a fixed location
//! ([`CredentialStore`]). [`Authorizer`] loads it on every attempt and only
//! falls back to an [`InteractiveFlow`] when nothing usable is stored. The
//! interactive flow is single-flight: concurrent callers share one run.

mod authorizer;
mod credential;
mod flow;
mod store;

pub use authorizer::{AuthState, Authorizer, CredentialProvider};
pub use credential::{AppCredentials, Credential, GrantedToken};
pub use flow::{AuthFuture, ConsoleFlow, InteractiveFlow, consent_url, parse_token_line};
pub use store::CredentialStore;

use std::path::PathBuf;
use std::sync::Arc;

/// Default persisted credential file, relative to the working directory.
pub const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Default operator-provisioned app credentials file.
pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";

/// Default scope requested from the storage backend.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Errors produced by the authorization flow.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("app credentials unavailable at {path}: {reason}")]
    AppCredentials { path: PathBuf, reason: String },

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("interactive authorization failed: {0}")]
    Flow(String),

    #[error("interactive authorization timed out")]
    Timeout,

    /// Failure of a flight shared with other callers.
    #[error(transparent)]
    Shared(Arc<AuthError>),
}
