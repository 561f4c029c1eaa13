//! Route guard predicates over [`AuthViewState`].

use crate::roles::Role;
use crate::types::AuthViewState;

/// Where unauthenticated users are sent.
pub const ONBOARDING_PATH: &str = "/onboarding";
/// Where authenticated users are sent away from public-only pages.
pub const HOME_PATH: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    ShowLoading,
    Redirect(String),
    Render,
}

/// Guard for pages that need a session, optionally limited to some roles.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    allowed_roles: Option<Vec<Role>>,
    login_path: String,
    home_path: String,
}

impl Default for RequireAuth {
    fn default() -> Self {
        Self {
            allowed_roles: None,
            login_path: ONBOARDING_PATH.to_string(),
            home_path: HOME_PATH.to_string(),
        }
    }
}

impl RequireAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn evaluate(&self, view: &AuthViewState) -> GuardDecision {
        if view.loading {
            return GuardDecision::ShowLoading;
        }
        if view.session.is_none() {
            return GuardDecision::Redirect(self.login_path.clone());
        }
        let Some(allowed) = &self.allowed_roles else {
            return GuardDecision::Render;
        };
        match view.role() {
            Some(role) if allowed.contains(&role) => GuardDecision::Render,
            Some(_) => GuardDecision::Redirect(self.home_path.clone()),
            // No profile to contradict the filter; it may never arrive.
            None => GuardDecision::Render,
        }
    }
}

/// Guard for public-only pages such as login and sign-up.
#[derive(Debug, Clone)]
pub struct RedirectIfAuthenticated {
    target: String,
}

impl Default for RedirectIfAuthenticated {
    fn default() -> Self {
        Self {
            target: HOME_PATH.to_string(),
        }
    }
}

impl RedirectIfAuthenticated {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn evaluate(&self, view: &AuthViewState) -> GuardDecision {
        if view.loading {
            GuardDecision::ShowLoading
        } else if view.session.is_some() {
            GuardDecision::Redirect(self.target.clone())
        } else {
            GuardDecision::Render
        }
    }
}
