//! Storage key constants.

/// Keys written by the OAuth role protocol.
pub struct StorageKeys;

impl StorageKeys {
    /// Role requested on a signup page before the OAuth redirect
    pub const OAUTH_ROLE: &'static str = "oauth_role";

    /// Role a login page expects the returning OAuth user to hold
    pub const OAUTH_EXPECTED_ROLE: &'static str = "oauth_expected_role";

    /// Last OAuth role-mismatch message, for the login page to display
    pub const OAUTH_ERROR: &'static str = "oauth_error";

    /// All protocol keys, in write order.
    pub const ALL: [&'static str; 3] = [
        Self::OAUTH_ROLE,
        Self::OAUTH_EXPECTED_ROLE,
        Self::OAUTH_ERROR,
    ];
}
