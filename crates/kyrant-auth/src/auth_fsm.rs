//! Authentication state machine using rust-fsm.
//!
//! The phase graph lives in the `auth_machine` module generated below. On
//! top of it, [`AuthCore::apply`] is the single reducer for every event
//! the client sees: provider notifications, timer expiries, profile loads
//! and explicit user actions. It mutates nothing outside the core and
//! returns the side effects (timers, fetches) for the runtime to perform,
//! which keeps the whole decision surface testable without a clock.
//!
//! ## Phase Diagram
//!
//! ```text
//!                ┌──────────────────┐
//!                │   Initializing   │ (initial)
//!                └───┬─────────┬────┘
//!   CallbackDetected │         │ NoSession / SafetyTimeout
//!                    ▼         │
//! ┌───────────────────────────┐│
//! │ AuthenticatingViaRedirect ││
//! └──────┬──────────────┬─────┘│
//!        │ CallbackTimeout /   │
//!        │ SafetyTimeout       ▼
//!        │ ─────────────► ┌─────────────────┐
//!        │                │ Unauthenticated │◄──────┐
//!        │ SessionFound   └────────┬────────┘       │
//!        ▼                         │ SessionFound   │ SignedOut
//! ┌─────────────────┐ ◄────────────┘                │
//! │  Authenticated  │ ──────────────────────────────┘
//! └─────────────────┘  SessionRefreshed (self loop)
//! ```

use crate::provider::{AuthEventKind, ProviderEvent};
use crate::types::{AuthViewState, RoleProfile, Session};
use rust_fsm::*;
use tracing::debug;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub auth_machine(Initializing)

    Initializing => {
        CallbackDetected => AuthenticatingViaRedirect,
        SessionFound => Authenticated,
        NoSession => Unauthenticated,
        SafetyTimeout => Unauthenticated,
        SignedOut => Unauthenticated
    },
    AuthenticatingViaRedirect => {
        SessionFound => Authenticated,
        // Landed on a callback URL but SignedIn never arrived
        CallbackTimeout => Unauthenticated,
        SafetyTimeout => Unauthenticated,
        SignedOut => Unauthenticated
    },
    Unauthenticated => {
        SessionFound => Authenticated,
        SignedOut => Unauthenticated
    },
    Authenticated => {
        SessionFound => Authenticated,
        SessionRefreshed => Authenticated,
        SignedOut => Unauthenticated
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthPhase;
pub use auth_machine::StateMachine as AuthMachine;

/// Everything that can move the auth core.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// The orchestrator mounted. `oauth_callback` is true when the current
    /// URL carries OAuth callback markers.
    Mounted { oauth_callback: bool },
    /// Notification from the identity provider.
    Provider(ProviderEvent),
    SafetyTimerElapsed,
    CallbackWaitElapsed,
    /// A profile fetch for `user_id` finished. `None` means not available.
    ProfileLoaded {
        user_id: String,
        profile: Option<RoleProfile>,
    },
    /// A role-checked password sign-in began. Provider `SignedIn` events
    /// are held back until it commits or is abandoned.
    SignInStarted,
    /// The role-checked sign-in passed; publish its session and profile.
    SignInCommitted {
        session: Session,
        profile: Option<RoleProfile>,
    },
    /// The role-checked sign-in failed. `rejected_user` names an identity
    /// that authenticated but was turned away; its sessions stay hidden
    /// until the provider confirms the sign-out.
    SignInAbandoned { rejected_user: Option<String> },
    /// An explicit action produced a session directly.
    SessionEstablished { session: Session },
    /// The user asked to sign out; clear the view before the provider answers.
    LocalSignOut,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartSafetyTimer,
    CancelSafetyTimer,
    StartCallbackWait,
    CancelCallbackWait,
    FetchProfile { user_id: String },
    /// Apply a pending OAuth sign-up role and check an expected login role.
    ReconcileOAuthRole { user_id: String },
    /// Results of in-flight work must be dropped.
    DiscardInFlight,
}

/// Outcome of one [`AuthCore::apply`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub effects: Vec<Effect>,
    /// `loading` went from true to false on this step.
    pub loading_resolved: bool,
    /// The safety timer forced `loading` to resolve.
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum SignInGate {
    Open,
    /// Closed; holds the latest `SignedIn` session seen meanwhile.
    Closed(Option<Session>),
    /// Sessions for this user are dropped until the next `SignedOut`.
    Rejected(String),
}

/// Phase, view and sign-in gate of one orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthCore {
    phase: AuthPhase,
    view: AuthViewState,
    gate: SignInGate,
}

impl Default for AuthCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure form of [`AuthCore::apply`]: `(state, event) -> (state, effects)`.
pub fn transition(core: &AuthCore, event: AuthEvent) -> (AuthCore, Transition) {
    let mut next = core.clone();
    let outcome = next.apply(event);
    (next, outcome)
}

impl AuthCore {
    pub fn new() -> Self {
        Self {
            phase: AuthPhase::Initializing,
            view: AuthViewState::default(),
            gate: SignInGate::Open,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn view(&self) -> &AuthViewState {
        &self.view
    }

    /// A role-checked sign-in is holding provider events back.
    pub fn sign_in_pending(&self) -> bool {
        matches!(self.gate, SignInGate::Closed(_))
    }

    pub fn apply(&mut self, event: AuthEvent) -> Transition {
        let mut out = Transition::default();

        match event {
            AuthEvent::Mounted { oauth_callback } => self.on_mounted(oauth_callback, &mut out),
            AuthEvent::Provider(event) => self.on_provider_event(event, &mut out),
            AuthEvent::SafetyTimerElapsed => self.on_safety_timeout(&mut out),
            AuthEvent::CallbackWaitElapsed => self.on_callback_wait_elapsed(&mut out),
            AuthEvent::ProfileLoaded { user_id, profile } => {
                self.on_profile_loaded(&user_id, profile)
            }
            AuthEvent::SignInStarted => self.gate = SignInGate::Closed(None),
            AuthEvent::SignInCommitted { session, profile } => {
                self.gate = SignInGate::Open;
                self.establish(session, profile, &mut out);
            }
            AuthEvent::SignInAbandoned { rejected_user } => {
                if let SignInGate::Closed(Some(held)) = &self.gate {
                    debug!(user_id = %held.user_id(), "Discarding session held during rejected sign-in");
                }
                self.gate = match rejected_user {
                    Some(user_id) => SignInGate::Rejected(user_id),
                    None => SignInGate::Open,
                };
            }
            AuthEvent::SessionEstablished { session } => {
                self.gate = SignInGate::Open;
                self.establish(session, None, &mut out);
            }
            AuthEvent::LocalSignOut => self.clear_session(&mut out),
        }

        out
    }

    fn on_mounted(&mut self, oauth_callback: bool, out: &mut Transition) {
        if !self.view.loading {
            return;
        }
        out.effects.push(Effect::StartSafetyTimer);
        if oauth_callback {
            self.step(AuthMachineInput::CallbackDetected);
        }
    }

    fn on_provider_event(&mut self, event: ProviderEvent, out: &mut Transition) {
        let ProviderEvent { kind, session } = event;

        match (kind, session) {
            (AuthEventKind::SignedOut, _) => self.clear_session(out),
            (AuthEventKind::InitialState, Some(session)) | (AuthEventKind::SignedIn, Some(session)) => {
                self.accept_session(session, out)
            }
            (AuthEventKind::InitialState, None) => self.on_empty_initial_state(out),
            (AuthEventKind::TokenRefreshed, Some(session))
            | (AuthEventKind::UserUpdated, Some(session)) => match self.phase {
                AuthPhase::Authenticated => self.refresh_session(session, out),
                AuthPhase::Initializing | AuthPhase::AuthenticatingViaRedirect => {
                    self.accept_session(session, out)
                }
                AuthPhase::Unauthenticated => {
                    debug!(kind = ?kind, "Ignoring session update while signed out");
                }
            },
            // A missing session never overwrites an established one.
            (kind, None) => debug!(kind = ?kind, "Ignoring provider event without a session"),
        }
    }

    fn accept_session(&mut self, session: Session, out: &mut Transition) {
        if let SignInGate::Closed(held) = &mut self.gate {
            debug!(user_id = %session.user_id(), "Holding session until sign-in completes");
            *held = Some(session);
            return;
        }
        if matches!(&self.gate, SignInGate::Rejected(rejected) if rejected.as_str() == session.user_id())
        {
            debug!(user_id = %session.user_id(), "Ignoring session of a rejected sign-in");
            return;
        }
        self.gate = SignInGate::Open;
        self.establish(session, None, out);
    }

    fn on_empty_initial_state(&mut self, out: &mut Transition) {
        match self.phase {
            AuthPhase::Initializing => {
                self.step(AuthMachineInput::NoSession);
                out.effects.push(Effect::CancelSafetyTimer);
                self.resolve_loading(out);
            }
            AuthPhase::AuthenticatingViaRedirect => {
                // The provider may still be exchanging the callback.
                if self.view.loading {
                    out.effects.push(Effect::StartCallbackWait);
                }
            }
            _ => debug!(phase = ?self.phase, "Ignoring empty initial state"),
        }
    }

    fn refresh_session(&mut self, session: Session, out: &mut Transition) {
        if self.view.user_id() != Some(session.user_id()) {
            self.accept_session(session, out);
            return;
        }
        self.step(AuthMachineInput::SessionRefreshed);
        self.view.identity = Some(session.identity.clone());
        self.view.session = Some(session);
    }

    fn establish(&mut self, session: Session, profile: Option<RoleProfile>, out: &mut Transition) {
        let user_id = session.user_id().to_string();

        if let Some(previous) = self.view.user_id() {
            if previous != user_id {
                debug!(previous = %previous, current = %user_id, "Identity changed");
                out.effects.push(Effect::DiscardInFlight);
                self.view.role_profile = None;
            }
        }

        self.step(AuthMachineInput::SessionFound);
        self.view.identity = Some(session.identity.clone());
        self.view.session = Some(session);
        if let Some(profile) = profile.filter(|p| p.user_id == user_id) {
            self.view.role_profile = Some(profile);
        }

        out.effects.push(Effect::CancelCallbackWait);
        out.effects.push(Effect::CancelSafetyTimer);
        if self.view.role_profile.is_none() {
            out.effects.push(Effect::FetchProfile {
                user_id: user_id.clone(),
            });
        }
        out.effects.push(Effect::ReconcileOAuthRole { user_id });
        self.resolve_loading(out);
    }

    fn clear_session(&mut self, out: &mut Transition) {
        self.step(AuthMachineInput::SignedOut);
        self.gate = match self.gate {
            SignInGate::Closed(_) => SignInGate::Closed(None),
            _ => SignInGate::Open,
        };
        self.view.session = None;
        self.view.identity = None;
        self.view.role_profile = None;

        out.effects.push(Effect::CancelCallbackWait);
        out.effects.push(Effect::CancelSafetyTimer);
        out.effects.push(Effect::DiscardInFlight);
        self.resolve_loading(out);
    }

    fn on_profile_loaded(&mut self, user_id: &str, profile: Option<RoleProfile>) {
        if self.view.user_id() != Some(user_id) {
            debug!(user_id = %user_id, "Dropping profile for a user that is no longer current");
            return;
        }
        match profile {
            Some(profile) if profile.user_id == user_id => self.view.role_profile = Some(profile),
            Some(profile) => {
                debug!(expected = %user_id, got = %profile.user_id, "Dropping profile keyed to another user")
            }
            None => debug!(user_id = %user_id, "Profile not available yet"),
        }
    }

    fn on_safety_timeout(&mut self, out: &mut Transition) {
        if !self.view.loading {
            return;
        }
        self.step(AuthMachineInput::SafetyTimeout);
        out.effects.push(Effect::CancelCallbackWait);
        out.forced = true;
        self.resolve_loading(out);
    }

    fn on_callback_wait_elapsed(&mut self, out: &mut Transition) {
        if self.phase != AuthPhase::AuthenticatingViaRedirect || !self.view.loading {
            return;
        }
        self.step(AuthMachineInput::CallbackTimeout);
        out.effects.push(Effect::CancelSafetyTimer);
        self.resolve_loading(out);
    }

    fn resolve_loading(&mut self, out: &mut Transition) {
        if self.view.loading {
            self.view.loading = false;
            out.loading_resolved = true;
        }
    }

    fn step(&mut self, input: AuthMachineInput) -> bool {
        match <auth_machine::Impl as StateMachineImpl>::transition(&self.phase, &input) {
            Some(next) => {
                if next != self.phase {
                    debug!(from = ?self.phase, to = ?next, "Auth phase transition");
                }
                self.phase = next;
                true
            }
            None => {
                debug!(phase = ?self.phase, input = ?input, "Input not valid in this phase");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::types::fixtures::{profile, session};

    fn mounted(oauth_callback: bool) -> AuthCore {
        let mut core = AuthCore::new();
        core.apply(AuthEvent::Mounted { oauth_callback });
        core
    }

    fn provider(event: ProviderEvent) -> AuthEvent {
        AuthEvent::Provider(event)
    }

    #[test]
    fn test_initial_phase_is_initializing() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthPhase::Initializing);
    }

    #[test]
    fn test_machine_callback_flow() {
        let mut machine = AuthMachine::new();

        machine.consume(&AuthMachineInput::CallbackDetected).unwrap();
        assert_eq!(*machine.state(), AuthPhase::AuthenticatingViaRedirect);

        machine.consume(&AuthMachineInput::SessionFound).unwrap();
        assert_eq!(*machine.state(), AuthPhase::Authenticated);
    }

    #[test]
    fn test_machine_cannot_refresh_without_session() {
        let mut machine = AuthMachine::new();
        assert!(machine.consume(&AuthMachineInput::SessionRefreshed).is_err());

        machine.consume(&AuthMachineInput::NoSession).unwrap();
        assert!(machine.consume(&AuthMachineInput::SessionRefreshed).is_err());
        assert!(machine.consume(&AuthMachineInput::CallbackTimeout).is_err());
    }

    #[test]
    fn test_mount_starts_safety_timer() {
        let (core, out) = transition(&AuthCore::new(), AuthEvent::Mounted { oauth_callback: false });
        assert_eq!(out.effects, vec![Effect::StartSafetyTimer]);
        assert_eq!(core.phase(), AuthPhase::Initializing);
        assert!(core.view().loading);
    }

    #[test]
    fn test_empty_initial_state_resolves_unauthenticated() {
        let (core, out) = transition(&mounted(false), provider(ProviderEvent::initial_state(None)));

        assert_eq!(core.phase(), AuthPhase::Unauthenticated);
        assert!(!core.view().loading);
        assert!(out.loading_resolved);
        assert!(!out.forced);
        assert!(out.effects.contains(&Effect::CancelSafetyTimer));
    }

    #[test]
    fn test_initial_session_authenticates_and_fetches_profile() {
        let (core, out) = transition(
            &mounted(false),
            provider(ProviderEvent::initial_state(Some(session("u1")))),
        );

        assert_eq!(core.phase(), AuthPhase::Authenticated);
        assert_eq!(core.view().user_id(), Some("u1"));
        assert!(!core.view().loading);
        assert!(out.effects.contains(&Effect::FetchProfile {
            user_id: "u1".to_string()
        }));
        assert!(out.effects.contains(&Effect::ReconcileOAuthRole {
            user_id: "u1".to_string()
        }));
    }

    #[test]
    fn test_callback_url_defers_empty_initial_state() {
        let core = mounted(true);
        assert_eq!(core.phase(), AuthPhase::AuthenticatingViaRedirect);

        let (core, out) = transition(&core, provider(ProviderEvent::initial_state(None)));
        assert!(core.view().loading);
        assert_eq!(out.effects, vec![Effect::StartCallbackWait]);

        let (core, out) = transition(&core, provider(ProviderEvent::signed_in(session("u1"))));
        assert_eq!(core.phase(), AuthPhase::Authenticated);
        assert!(out.loading_resolved);
        assert!(out.effects.contains(&Effect::CancelCallbackWait));
    }

    #[test]
    fn test_callback_wait_elapsed_resolves_unauthenticated() {
        let core = mounted(true);
        let (core, _) = transition(&core, provider(ProviderEvent::initial_state(None)));
        let (core, out) = transition(&core, AuthEvent::CallbackWaitElapsed);

        assert_eq!(core.phase(), AuthPhase::Unauthenticated);
        assert!(out.loading_resolved);
        assert!(out.effects.contains(&Effect::CancelSafetyTimer));
    }

    #[test]
    fn test_safety_timeout_forces_resolution_once() {
        let (core, out) = transition(&mounted(false), AuthEvent::SafetyTimerElapsed);
        assert!(out.forced);
        assert!(out.loading_resolved);
        assert_eq!(core.phase(), AuthPhase::Unauthenticated);

        let (_, again) = transition(&core, AuthEvent::SafetyTimerElapsed);
        assert_eq!(again, Transition::default());
    }

    #[test]
    fn test_late_signed_in_after_timeout_still_authenticates() {
        let (core, _) = transition(&mounted(false), AuthEvent::SafetyTimerElapsed);
        let (core, out) = transition(&core, provider(ProviderEvent::signed_in(session("u1"))));

        assert_eq!(core.phase(), AuthPhase::Authenticated);
        assert!(!core.view().loading);
        assert!(!out.loading_resolved);
    }

    #[test]
    fn test_null_token_refresh_does_not_clear_session() {
        let (core, _) = transition(
            &mounted(false),
            provider(ProviderEvent::initial_state(Some(session("u1")))),
        );
        let (core, out) = transition(&core, provider(ProviderEvent::token_refreshed(None)));

        assert_eq!(core.view().user_id(), Some("u1"));
        assert!(out.effects.is_empty());
    }

    #[test]
    fn test_token_refresh_same_user_keeps_profile() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(Some(session("u1")))));
        core.apply(AuthEvent::ProfileLoaded {
            user_id: "u1".into(),
            profile: Some(profile("u1", Role::Designer)),
        });

        let mut refreshed = session("u1");
        refreshed.access_token = "rotated".into();
        let out = core.apply(provider(ProviderEvent::token_refreshed(Some(refreshed))));

        assert!(out.effects.is_empty());
        assert_eq!(core.view().role(), Some(Role::Designer));
        assert_eq!(
            core.view().session.as_ref().map(|s| s.access_token.as_str()),
            Some("rotated")
        );
    }

    #[test]
    fn test_token_refresh_ignored_while_signed_out() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(None)));
        core.apply(provider(ProviderEvent::token_refreshed(Some(session("u1")))));

        assert_eq!(core.phase(), AuthPhase::Unauthenticated);
        assert!(core.view().session.is_none());
    }

    #[test]
    fn test_identity_change_discards_in_flight_and_profile() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(Some(session("u1")))));
        core.apply(AuthEvent::ProfileLoaded {
            user_id: "u1".into(),
            profile: Some(profile("u1", Role::Designer)),
        });

        let out = core.apply(provider(ProviderEvent::signed_in(session("u2"))));

        assert_eq!(core.view().user_id(), Some("u2"));
        assert!(core.view().role_profile.is_none());
        assert!(out.effects.contains(&Effect::DiscardInFlight));
        assert!(out.effects.contains(&Effect::FetchProfile {
            user_id: "u2".to_string()
        }));
    }

    #[test]
    fn test_stale_profile_is_dropped() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(Some(session("u2")))));
        core.apply(AuthEvent::ProfileLoaded {
            user_id: "u1".into(),
            profile: Some(profile("u1", Role::Merchant)),
        });

        assert!(core.view().role_profile.is_none());
    }

    #[test]
    fn test_missing_profile_does_not_erase_loaded_one() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(Some(session("u1")))));
        core.apply(AuthEvent::ProfileLoaded {
            user_id: "u1".into(),
            profile: Some(profile("u1", Role::Merchant)),
        });
        core.apply(AuthEvent::ProfileLoaded {
            user_id: "u1".into(),
            profile: None,
        });

        assert_eq!(core.view().role(), Some(Role::Merchant));
    }

    #[test]
    fn test_signed_out_clears_everything() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(Some(session("u1")))));
        let out = core.apply(provider(ProviderEvent::signed_out()));

        assert_eq!(core.phase(), AuthPhase::Unauthenticated);
        assert_eq!(core.view(), &AuthViewState { loading: false, ..AuthViewState::default() });
        assert!(out.effects.contains(&Effect::DiscardInFlight));
    }

    #[test]
    fn test_sign_in_gate_holds_signed_in_until_commit() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(None)));

        core.apply(AuthEvent::SignInStarted);
        let out = core.apply(provider(ProviderEvent::signed_in(session("u1"))));
        assert!(out.effects.is_empty());
        assert!(core.view().session.is_none());
        assert!(core.sign_in_pending());

        let out = core.apply(AuthEvent::SignInCommitted {
            session: session("u1"),
            profile: Some(profile("u1", Role::Merchant)),
        });
        assert!(!core.sign_in_pending());
        assert_eq!(core.view().role(), Some(Role::Merchant));
        assert!(!out.effects.iter().any(|e| matches!(e, Effect::FetchProfile { .. })));
    }

    #[test]
    fn test_abandoned_sign_in_never_publishes_held_session() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(None)));

        core.apply(AuthEvent::SignInStarted);
        core.apply(provider(ProviderEvent::signed_in(session("u1"))));
        core.apply(AuthEvent::SignInAbandoned {
            rejected_user: Some("u1".into()),
        });

        assert!(core.view().session.is_none());
        assert_eq!(core.phase(), AuthPhase::Unauthenticated);
    }

    #[test]
    fn test_rejected_user_events_arriving_late_are_ignored() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(None)));

        core.apply(AuthEvent::SignInStarted);
        core.apply(AuthEvent::SignInAbandoned {
            rejected_user: Some("u1".into()),
        });
        let out = core.apply(provider(ProviderEvent::signed_in(session("u1"))));
        assert!(out.effects.is_empty());
        assert!(core.view().session.is_none());

        core.apply(provider(ProviderEvent::signed_out()));
        core.apply(provider(ProviderEvent::signed_in(session("u1"))));
        assert_eq!(core.view().user_id(), Some("u1"));
    }

    #[test]
    fn test_failed_sign_in_reopens_gate() {
        let mut core = mounted(false);
        core.apply(provider(ProviderEvent::initial_state(None)));
        core.apply(AuthEvent::SignInStarted);
        core.apply(AuthEvent::SignInAbandoned { rejected_user: None });

        assert!(!core.sign_in_pending());
        core.apply(provider(ProviderEvent::signed_in(session("u2"))));
        assert_eq!(core.view().user_id(), Some("u2"));
    }

    /// Drive every short event sequence and check the invariants that must
    /// hold regardless of ordering.
    #[test]
    fn test_invariants_hold_for_all_short_sequences() {
        let alphabet = vec![
            provider(ProviderEvent::initial_state(None)),
            provider(ProviderEvent::initial_state(Some(session("u1")))),
            provider(ProviderEvent::signed_in(session("u1"))),
            provider(ProviderEvent::signed_in(session("u2"))),
            provider(ProviderEvent::signed_out()),
            provider(ProviderEvent::token_refreshed(None)),
            provider(ProviderEvent::token_refreshed(Some(session("u1")))),
            provider(ProviderEvent::user_updated(None)),
            AuthEvent::SafetyTimerElapsed,
            AuthEvent::CallbackWaitElapsed,
            AuthEvent::ProfileLoaded {
                user_id: "u1".into(),
                profile: Some(profile("u1", Role::Designer)),
            },
            AuthEvent::SignInStarted,
            AuthEvent::SignInAbandoned { rejected_user: None },
            AuthEvent::SignInAbandoned {
                rejected_user: Some("u1".into()),
            },
            AuthEvent::LocalSignOut,
        ];
        let n = alphabet.len();
        let depth = 4u32;

        for oauth_callback in [false, true] {
            for code in 0..n.pow(depth) {
                let mut core = mounted(oauth_callback);
                let mut resolutions = 0;
                let mut rest = code;

                for _ in 0..depth {
                    let event = alphabet[rest % n].clone();
                    rest /= n;

                    let before = core.clone();
                    let out = core.apply(event.clone());

                    assert!(
                        before.view.loading || !core.view.loading,
                        "loading flipped back to true on {:?}",
                        event
                    );
                    if out.loading_resolved {
                        assert!(before.view.loading);
                        resolutions += 1;
                    }
                    if let AuthEvent::Provider(ProviderEvent { kind, session: None }) = &event {
                        if *kind != AuthEventKind::SignedOut {
                            assert_eq!(before.view.session, core.view.session);
                        }
                    }
                    if let Some(profile) = &core.view.role_profile {
                        assert_eq!(core.view.user_id(), Some(profile.user_id.as_str()));
                    }
                    assert_eq!(core.view.session.is_some(), core.phase == AuthPhase::Authenticated);
                }

                assert!(resolutions <= 1);
            }
        }
    }
}
