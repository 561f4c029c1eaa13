//! Role intents carried across an OAuth redirect.
//!
//! Before leaving for the provider the client records what it wants in
//! durable storage: the role chosen on a sign-up page, or the role whose
//! login page started the flow. After the redirect lands, the new session
//! reconciles against those keys. Keys are removed only once the action
//! they describe has finished, so an interrupted reconcile is retried on
//! the next session event.

use crate::profile_sync::{fetch_profile_with_retry, ProfileRetryConfig};
use crate::provider::{IdentityProvider, ProfileStore};
use crate::roles::{validate_signup_role, Role, RoleMismatch, DEFAULT_PROVIDER_ROLE};
use crate::types::RoleProfile;
use crate::AuthResult;
use chrono::Utc;
use kyrant_storage::IntentStorage;
use serde_json::json;
use tracing::{debug, info, warn};

/// Outcome of applying a stored sign-up role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupRoleOutcome {
    /// No sign-up role was pending.
    NoIntent,
    /// The profile row does not exist yet; the key stays for a later attempt.
    Deferred,
    /// Nothing to write: the profile already has the requested role, or it
    /// has moved off the provider default. The key is deleted.
    AlreadyResolved,
    /// The profile role was changed to the requested one.
    Applied(RoleProfile),
}

/// Outcome of checking a stored expected login role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedRoleOutcome {
    NoExpectation,
    Allowed,
    Mismatch(RoleMismatch),
}

#[derive(Clone)]
pub struct RoleIntentProtocol {
    intents: IntentStorage,
}

impl RoleIntentProtocol {
    pub fn new(intents: IntentStorage) -> Self {
        Self { intents }
    }

    pub fn intents(&self) -> &IntentStorage {
        &self.intents
    }

    /// Record the role picked on a sign-up page. Returns the clamped role.
    pub fn prepare_signup_redirect(&self, requested: &str) -> AuthResult<Role> {
        let role = validate_signup_role(requested);
        self.intents.clear_oauth_error()?;
        self.intents.set_signup_role(role.as_str())?;
        debug!(role = %role, "Stored OAuth sign-up role");
        Ok(role)
    }

    /// Record the role whose login page started the redirect.
    pub fn prepare_login_redirect(&self, expected: Role) -> AuthResult<()> {
        self.intents.clear_oauth_error()?;
        self.intents.set_expected_role(expected.as_str())?;
        debug!(expected = %expected, "Stored OAuth expected role");
        Ok(())
    }

    /// Drop both intents after a redirect failed to start.
    pub fn abandon_redirect(&self) {
        if let Err(e) = self.intents.clear_signup_role() {
            warn!(error = %e, "Failed to clear OAuth sign-up role");
        }
        if let Err(e) = self.intents.clear_expected_role() {
            warn!(error = %e, "Failed to clear OAuth expected role");
        }
    }

    /// Drop the sign-up role, if any. Called on sign-out.
    pub fn clear_signup_role(&self) -> AuthResult<()> {
        self.intents.clear_signup_role()?;
        Ok(())
    }

    pub fn has_expected_role(&self) -> AuthResult<bool> {
        Ok(self.intents.expected_role()?.is_some())
    }

    /// Read and delete the message left by a rejected OAuth login.
    pub fn take_error(&self) -> AuthResult<Option<String>> {
        Ok(self.intents.take_oauth_error()?)
    }

    /// Apply a pending sign-up role to the freshly authenticated user.
    ///
    /// OAuth sign-ups are created with the default role, so a different
    /// stored role is pushed to user metadata and then to the profile row.
    /// Only a profile still on the default role is changed; any other role
    /// was settled elsewhere and is never overwritten. The profile read is
    /// retried since the row may not be written yet. When updates run, the
    /// key is deleted only after both succeed.
    pub async fn reconcile_signup_role(
        &self,
        user_id: &str,
        provider: &dyn IdentityProvider,
        profiles: &dyn ProfileStore,
        retry: &ProfileRetryConfig,
    ) -> AuthResult<SignupRoleOutcome> {
        let Some(raw) = self.intents.signup_role()? else {
            return Ok(SignupRoleOutcome::NoIntent);
        };
        // Storage is untrusted; clamp again.
        let requested = validate_signup_role(&raw);

        let Some(profile) = fetch_profile_with_retry(profiles, user_id, retry).await else {
            debug!(user_id = %user_id, "Profile missing; deferring sign-up role");
            return Ok(SignupRoleOutcome::Deferred);
        };

        if profile.role != DEFAULT_PROVIDER_ROLE || profile.role == requested {
            debug!(
                user_id = %user_id,
                current = %profile.role,
                requested = %requested,
                "Sign-up role already resolved"
            );
            self.intents.clear_signup_role()?;
            return Ok(SignupRoleOutcome::AlreadyResolved);
        }

        provider
            .update_user_metadata(json!({ "role": requested.as_str() }))
            .await?;
        profiles.update_profile_role(user_id, requested).await?;
        self.intents.clear_signup_role()?;

        info!(
            user_id = %user_id,
            from = %profile.role,
            to = %requested,
            "Applied OAuth sign-up role"
        );

        Ok(SignupRoleOutcome::Applied(RoleProfile {
            role: requested,
            updated_at: Utc::now(),
            ..profile
        }))
    }

    /// Compare the stored expected role with the user's actual role.
    ///
    /// Consumes the key in every outcome. An absent profile lets the user
    /// through; there is nothing yet to contradict the page they used.
    pub fn check_expected_role(
        &self,
        profile: Option<&RoleProfile>,
    ) -> AuthResult<ExpectedRoleOutcome> {
        let Some(raw) = self.intents.expected_role()? else {
            return Ok(ExpectedRoleOutcome::NoExpectation);
        };
        self.intents.clear_expected_role()?;

        let Some(expected) = Role::parse(&raw) else {
            warn!(value = %raw, "Discarding unreadable expected role");
            return Ok(ExpectedRoleOutcome::NoExpectation);
        };

        match profile {
            Some(profile) if profile.role != expected => {
                let mismatch = RoleMismatch {
                    actual: profile.role,
                    expected,
                };
                self.intents.set_oauth_error(&mismatch.to_string())?;
                Ok(ExpectedRoleOutcome::Mismatch(mismatch))
            }
            _ => Ok(ExpectedRoleOutcome::Allowed),
        }
    }
}
