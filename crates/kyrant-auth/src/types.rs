//! Identity, session and profile types shared by the orchestrator and providers.

use crate::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated principal as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// The provider has confirmed the email address behind this session.
    #[serde(default)]
    pub email_verified_session_present: bool,
}

/// A provider session. Token fields are opaque to the orchestrator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_token: String,
    pub refresh_token: String,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.identity.id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// Tokens never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Application-level profile record keyed by the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub avatar_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable profile fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.avatar_ref.is_none()
    }
}

/// What the UI renders from.
///
/// `loading` starts `true` and is cleared exactly once per mount; it never
/// flips back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthViewState {
    pub session: Option<Session>,
    pub identity: Option<Identity>,
    pub role_profile: Option<RoleProfile>,
    pub loading: bool,
}

impl Default for AuthViewState {
    fn default() -> Self {
        Self {
            session: None,
            identity: None,
            role_profile: None,
            loading: true,
        }
    }
}

impl AuthViewState {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.id.as_str())
    }

    pub fn role(&self) -> Option<Role> {
        self.role_profile.as_ref().map(|profile| profile.role)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_default_view_is_loading_and_empty() {
        let view = AuthViewState::default();
        assert!(view.loading);
        assert!(!view.is_authenticated());
        assert_eq!(view.user_id(), None);
        assert_eq!(view.role(), None);
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let rendered = format!("{:?}", session("u1"));
        assert!(rendered.contains("u1"));
        assert!(!rendered.contains("access-u1"));
        assert!(!rendered.contains("refresh-u1"));
    }

    #[test]
    fn test_session_expiry() {
        let session = session("u1");
        assert!(!session.is_expired_at(session.issued_at));
        assert!(session.is_expired_at(session.expires_at));
    }

    #[test]
    fn test_profile_update_skips_absent_fields() {
        let update = ProfileUpdate {
            display_name: Some("Ada".to_string()),
            avatar_ref: None,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "display_name": "Ada" }));
        assert!(ProfileUpdate::default().is_empty());
    }
}
