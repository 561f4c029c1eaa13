//! Client-side authentication orchestrator for Kyrant.
//!
//! This crate provides:
//! - An explicit FSM over the client's auth phases with a pure transition function
//! - Profile loading with retry while the backend trigger catches up
//! - The OAuth role protocol carried across redirects in durable storage
//! - Role-checked password sign-in that never publishes a rejected session
//! - Route guard decisions derived from the published view
//! - Supabase adapters for the identity provider and profile store

mod auth_fsm;
mod callback;
mod error;
mod guards;
mod in_flight;
mod oauth_role;
mod orchestrator;
mod profile_sync;
mod provider;
mod roles;
mod supabase_client;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{
    transition, AuthCore, AuthEvent, AuthMachine, AuthMachineInput, AuthPhase, Effect, Transition,
};
pub use callback::{is_oauth_callback_url, parse_callback_tokens, CallbackTokens};
pub use error::{AuthError, AuthResult, SignInError};
pub use guards::{GuardDecision, RedirectIfAuthenticated, RequireAuth, HOME_PATH, ONBOARDING_PATH};
pub use in_flight::{InFlightRegistry, TaskKind, TaskTicket};
pub use oauth_role::{ExpectedRoleOutcome, RoleIntentProtocol, SignupRoleOutcome};
pub use orchestrator::{AuthOrchestrator, OrchestratorConfig, SignUpOutcome};
pub use profile_sync::{fetch_profile_with_retry, ProfileRetryConfig};
pub use provider::{
    AuthEventKind, AuthEventReceiver, IdentityProvider, OAuthRedirectRequest, ProfileStore,
    ProviderEvent, SignUpMetadata, SignUpResponse, SignedUpUser,
};
pub use roles::{
    validate_signup_role, Role, RoleMismatch, DEFAULT_PROVIDER_ROLE, SELF_ASSIGNABLE_ROLES,
};
pub use supabase_client::{project_ref_from_url, SupabaseAuthClient};
pub use types::{AuthViewState, Identity, ProfileUpdate, RoleProfile, Session};
pub use validation::{validate_credentials, validate_email, validate_password, MIN_PASSWORD_LEN};
