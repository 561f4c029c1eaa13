//! Authentication error types.

use crate::roles::RoleMismatch;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Sign-up targeted an email that already has an account.
    ///
    /// The provider hides this behind a fake success (a user with no
    /// identities); we surface it as a distinct error instead.
    #[error("An account with this email already exists")]
    AlreadyRegistered,

    /// Input rejected before reaching the provider
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider rejected the request
    #[error("Provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// OAuth flow error
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// No session
    #[error("Not logged in")]
    NotLoggedIn,

    /// Session was invalidated server-side (revoked, logged out elsewhere, etc.)
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// The orchestrator was unmounted
    #[error("Auth orchestrator has been unmounted")]
    Unmounted,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] kyrant_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - HTTP errors with 5xx status codes
    /// - Connection timeouts
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::NetworkUnavailable => true,
            AuthError::Timeout => true,
            AuthError::Provider { status, .. } => *status >= 500,
            AuthError::Http(e) => e.status().is_some_and(|status| status.is_server_error()),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout
        } else if err.is_connect() {
            AuthError::NetworkUnavailable
        } else {
            AuthError::Http(err)
        }
    }
}

impl From<kyrant_config_and_utils::CoreError> for AuthError {
    fn from(err: kyrant_config_and_utils::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Failure of a password sign-in.
///
/// A role mismatch is a terminal outcome of a sign-in that reached the
/// provider successfully, so it is kept apart from provider failures.
#[derive(Error, Debug)]
pub enum SignInError {
    #[error("{0}")]
    RoleMismatch(RoleMismatch),

    #[error(transparent)]
    Provider(#[from] AuthError),
}

impl SignInError {
    /// Message suitable for showing next to the login form.
    pub fn user_message(&self) -> String {
        match self {
            SignInError::RoleMismatch(mismatch) => mismatch.to_string(),
            SignInError::Provider(AuthError::InvalidCredentials(msg)) => msg.clone(),
            SignInError::Provider(err) => err.to_string(),
        }
    }
}
