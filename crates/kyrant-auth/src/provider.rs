//! Seams to the external identity provider and profile store.
//!
//! The orchestrator only talks to these traits; [`crate::SupabaseAuthClient`]
//! implements both against a Supabase project, and tests substitute
//! in-memory fakes.

use crate::roles::Role;
use crate::types::{ProfileUpdate, RoleProfile, Session};
use crate::AuthResult;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Kind of an auth state change reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    /// First event after subscribing; carries whatever session is stored.
    InitialState,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// An auth state change, with the session it refers to when there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl ProviderEvent {
    pub fn initial_state(session: Option<Session>) -> Self {
        Self {
            kind: AuthEventKind::InitialState,
            session,
        }
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            session: None,
        }
    }

    pub fn token_refreshed(session: Option<Session>) -> Self {
        Self {
            kind: AuthEventKind::TokenRefreshed,
            session,
        }
    }

    pub fn user_updated(session: Option<Session>) -> Self {
        Self {
            kind: AuthEventKind::UserUpdated,
            session,
        }
    }
}

/// Stream of provider events. Dropping it unsubscribes.
pub type AuthEventReceiver = mpsc::UnboundedReceiver<ProviderEvent>;

/// Metadata attached to a password sign-up.
///
/// `role` and `full_name` become user metadata that the backend trigger
/// copies into the new profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignUpMetadata {
    pub role: Role,
    pub full_name: String,
    /// Where the confirmation email should send the user.
    #[serde(skip)]
    pub email_redirect_to: Option<String>,
}

/// The user object returned by a sign-up call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUpUser {
    pub id: String,
    pub email: Option<String>,
    /// Linked identities. Zero means the email was already registered.
    pub identity_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignUpResponse {
    pub user: Option<SignedUpUser>,
    /// Present only when the project does not require email confirmation.
    pub session: Option<Session>,
}

/// Parameters for starting a redirect-based social login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRedirectRequest {
    pub provider: String,
    pub redirect_to: String,
    pub query_params: Vec<(String, String)>,
}

/// Identity provider: owns credentials, sessions and the event stream.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The stored session, if any.
    async fn get_current_session(&self) -> AuthResult<Option<Session>>;

    /// Subscribe to auth changes. The first event delivered is
    /// [`AuthEventKind::InitialState`].
    fn subscribe(&self) -> AuthEventReceiver;

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> AuthResult<SignUpResponse>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Start a social login. Returns the URL to navigate to.
    async fn begin_oauth_redirect(&self, request: &OAuthRedirectRequest) -> AuthResult<String>;

    async fn sign_out(&self) -> AuthResult<()>;

    /// Merge `fields` into the current user's metadata.
    async fn update_user_metadata(&self, fields: serde_json::Value) -> AuthResult<()>;

    /// Prefix of every storage key the provider owns, for local purges
    /// when a remote sign-out fails.
    fn storage_key_prefix(&self) -> String;
}

/// Profile records keyed by identity id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the row does not exist (yet).
    async fn fetch_profile(&self, user_id: &str) -> AuthResult<Option<RoleProfile>>;

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> AuthResult<()>;

    async fn update_profile_role(&self, user_id: &str, role: Role) -> AuthResult<()>;
}
