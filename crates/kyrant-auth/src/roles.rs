//! Role values and sign-up role clamping.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A user's role in the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Designer,
    Merchant,
    Admin,
}

/// Role the backend trigger assigns when sign-up metadata carries none.
/// OAuth sign-ups always land here first.
pub const DEFAULT_PROVIDER_ROLE: Role = Role::Merchant;

/// Roles a user may pick for themselves at sign-up.
pub const SELF_ASSIGNABLE_ROLES: [Role; 2] = [Role::Designer, Role::Merchant];

impl Role {
    /// Wire representation (`designer`, `merchant`, `admin`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Designer => "designer",
            Role::Merchant => "merchant",
            Role::Admin => "admin",
        }
    }

    /// Capitalised name for user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Designer => "Designer",
            Role::Merchant => "Merchant",
            Role::Admin => "Admin",
        }
    }

    /// Parse any known role, case-insensitively. Unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "designer" => Some(Role::Designer),
            "merchant" => Some(Role::Merchant),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_self_assignable(&self) -> bool {
        SELF_ASSIGNABLE_ROLES.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp an untrusted role string to one a user may self-assign.
///
/// Anything outside `{designer, merchant}` (including `admin`, empty and
/// garbage input) becomes [`DEFAULT_PROVIDER_ROLE`].
pub fn validate_signup_role(raw: &str) -> Role {
    match Role::parse(raw) {
        Some(role) if role.is_self_assignable() => role,
        _ => {
            debug!(requested = %raw, clamped_to = %DEFAULT_PROVIDER_ROLE, "Clamped sign-up role");
            DEFAULT_PROVIDER_ROLE
        }
    }
}

/// An authenticated user arrived through the login page of a different role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleMismatch {
    pub actual: Role,
    pub expected: Role,
}

impl fmt::Display for RoleMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "You're registered as a {}. Please use the {} login page instead of the {} one.",
            self.actual.label(),
            self.actual.label(),
            self.expected.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_signup_role_keeps_self_assignable() {
        assert_eq!(validate_signup_role("designer"), Role::Designer);
        assert_eq!(validate_signup_role("merchant"), Role::Merchant);
        assert_eq!(validate_signup_role(" Designer "), Role::Designer);
    }

    #[test]
    fn test_validate_signup_role_clamps_admin_and_garbage() {
        assert_eq!(validate_signup_role("admin"), Role::Merchant);
        assert_eq!(validate_signup_role(""), Role::Merchant);
        assert_eq!(validate_signup_role("superuser"), Role::Merchant);
        assert_eq!(validate_signup_role("designer; drop table"), Role::Merchant);
    }

    #[test]
    fn test_validate_signup_role_is_idempotent() {
        for raw in ["designer", "merchant", "admin", "", "DESIGNER", "???", " merchant"] {
            let once = validate_signup_role(raw);
            assert_eq!(validate_signup_role(once.as_str()), once, "input {:?}", raw);
            assert!(once.is_self_assignable());
        }
    }

    #[test]
    fn test_role_parse_and_display_agree() {
        for role in [Role::Designer, Role::Merchant, Role::Admin] {
            assert_eq!(Role::parse(&role.to_string()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn test_role_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Designer).unwrap(), "\"designer\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_role_mismatch_message() {
        let mismatch = RoleMismatch {
            actual: Role::Designer,
            expected: Role::Merchant,
        };
        assert_eq!(
            mismatch.to_string(),
            "You're registered as a Designer. Please use the Designer login page instead of the Merchant one."
        );
    }
}
