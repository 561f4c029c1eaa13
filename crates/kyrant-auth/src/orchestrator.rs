//! Runtime around the auth core.
//!
//! [`AuthOrchestrator`] feeds provider events, timer expiries and user
//! actions through [`AuthCore::apply`] and performs the effects each
//! transition asks for. The resulting [`AuthViewState`] is published on a
//! `tokio::sync::watch` channel.
//!
//! Must be mounted inside a Tokio runtime.

use crate::auth_fsm::{AuthCore, AuthEvent, AuthPhase, Effect};
use crate::callback::is_oauth_callback_url;
use crate::error::SignInError;
use crate::guards::HOME_PATH;
use crate::in_flight::{InFlightRegistry, TaskKind, TaskTicket};
use crate::oauth_role::{ExpectedRoleOutcome, RoleIntentProtocol, SignupRoleOutcome};
use crate::profile_sync::{fetch_profile_with_retry, ProfileRetryConfig};
use crate::provider::{IdentityProvider, OAuthRedirectRequest, ProfileStore, SignUpMetadata};
use crate::roles::{validate_signup_role, Role, RoleMismatch};
use crate::types::{AuthViewState, ProfileUpdate, RoleProfile};
use crate::validation::validate_credentials;
use crate::{AuthError, AuthResult};
use kyrant_config_and_utils::{Config, DEFAULT_SITE_URL};
use kyrant_storage::{DurableStorage, IntentStorage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Path the confirmation email links back to.
const EMAIL_CONFIRMED_PATH: &str = "/email-confirmed";
const DEFAULT_OAUTH_PROVIDER: &str = "google";

/// Timing and redirect settings for an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on the initial auth check.
    pub safety_timeout: Duration,
    /// Extra wait for `SignedIn` when mounted on an OAuth callback URL.
    pub callback_wait: Duration,
    pub profile_retry: ProfileRetryConfig,
    /// Public origin used for redirect targets.
    pub site_url: String,
    pub oauth_provider: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            safety_timeout: config.safety_timeout(),
            callback_wait: config.callback_wait(),
            profile_retry: ProfileRetryConfig::from(&config.profile_retry),
            site_url: config.site_url.clone(),
            oauth_provider: DEFAULT_OAUTH_PROVIDER.to_string(),
        }
    }
}

impl OrchestratorConfig {
    fn origin(&self) -> &str {
        let origin = self.site_url.trim_end_matches('/');
        if origin.is_empty() {
            DEFAULT_SITE_URL
        } else {
            origin
        }
    }

    /// Where the provider sends the browser after a social login.
    pub fn oauth_redirect_url(&self) -> String {
        format!("{}{}", self.origin(), HOME_PATH)
    }

    pub fn email_redirect_url(&self) -> String {
        format!("{}{}", self.origin(), EMAIL_CONFIRMED_PATH)
    }
}

/// Result of a password sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user_id: Option<String>,
    /// No session yet; the user must click the confirmation link first.
    pub needs_email_confirmation: bool,
}

#[derive(Debug, Clone, Copy)]
enum TimerSlot {
    Safety,
    CallbackWait,
}

#[derive(Default)]
struct Timers {
    safety: Option<JoinHandle<()>>,
    callback_wait: Option<JoinHandle<()>>,
}

impl Timers {
    fn slot(&mut self, slot: TimerSlot) -> &mut Option<JoinHandle<()>> {
        match slot {
            TimerSlot::Safety => &mut self.safety,
            TimerSlot::CallbackWait => &mut self.callback_wait,
        }
    }
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    roles: RoleIntentProtocol,
    config: OrchestratorConfig,
    core: Mutex<AuthCore>,
    view_tx: watch::Sender<AuthViewState>,
    timers: Mutex<Timers>,
    in_flight: InFlightRegistry,
    listener: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

/// Client-side authentication orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct AuthOrchestrator {
    inner: Arc<Inner>,
}

impl AuthOrchestrator {
    /// Subscribe to the provider and start resolving the initial state.
    ///
    /// `current_url` is the page the client is on; OAuth callback markers
    /// in it extend the wait for the provider's `SignedIn`.
    pub fn mount(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        storage: Arc<dyn DurableStorage>,
        config: OrchestratorConfig,
        current_url: Option<&str>,
    ) -> Self {
        let oauth_callback = current_url.is_some_and(is_oauth_callback_url);
        let (view_tx, _) = watch::channel(AuthViewState::default());

        let inner = Arc::new(Inner {
            provider,
            profiles,
            roles: RoleIntentProtocol::new(IntentStorage::new(storage)),
            config,
            core: Mutex::new(AuthCore::new()),
            view_tx,
            timers: Mutex::new(Timers::default()),
            in_flight: InFlightRegistry::new(),
            listener: Mutex::new(None),
            torn_down: AtomicBool::new(false),
        });

        info!(oauth_callback, "Mounting auth orchestrator");
        inner.dispatch(AuthEvent::Mounted { oauth_callback });

        let mut events = inner.provider.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let listener = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.is_torn_down() {
                    break;
                }
                debug!(kind = ?event.kind, has_session = event.session.is_some(), "Provider event");
                inner.dispatch(AuthEvent::Provider(event));
            }
        });
        *inner.listener.lock() = Some(listener);

        Self { inner }
    }

    /// Stop reacting to anything. In-flight work finishes but is discarded.
    pub fn unmount(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Unmounting auth orchestrator");
        self.inner.shutdown();
    }

    pub fn is_mounted(&self) -> bool {
        !self.inner.is_torn_down()
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> AuthViewState {
        self.inner.view_tx.borrow().clone()
    }

    /// Receive every published view.
    pub fn subscribe_view(&self) -> watch::Receiver<AuthViewState> {
        self.inner.view_tx.subscribe()
    }

    pub fn phase(&self) -> AuthPhase {
        self.inner.core.lock().phase()
    }

    /// Wait until `loading` resolves and return the view at that point.
    pub async fn wait_until_loaded(&self) -> AuthViewState {
        let mut rx = self.subscribe_view();
        let view = match rx.wait_for(|view| !view.loading).await {
            Ok(view) => (*view).clone(),
            Err(_) => self.view(),
        };
        view
    }

    /// Create an account with email and password.
    ///
    /// `role` is clamped to a self-assignable role. An email that is
    /// already registered yields [`AuthError::AlreadyRegistered`].
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        role: &str,
        display_name: Option<&str>,
    ) -> AuthResult<SignUpOutcome> {
        self.inner.ensure_mounted()?;
        validate_credentials(email, password)?;

        let metadata = SignUpMetadata {
            role: validate_signup_role(role),
            full_name: display_name.unwrap_or_default().trim().to_string(),
            email_redirect_to: Some(self.inner.config.email_redirect_url()),
        };

        let response = self
            .inner
            .provider
            .sign_up_with_password(email.trim(), password, &metadata)
            .await?;

        let user_id = response.user.as_ref().map(|user| user.id.clone());
        if response.session.is_none()
            && response
                .user
                .as_ref()
                .is_some_and(|user| user.identity_count == 0)
        {
            info!("Sign-up targeted an existing account");
            return Err(AuthError::AlreadyRegistered);
        }

        match response.session {
            Some(session) => {
                info!(user_id = %session.user_id(), role = %metadata.role, "Signed up with immediate session");
                self.inner.dispatch(AuthEvent::SessionEstablished { session });
                Ok(SignUpOutcome {
                    user_id,
                    needs_email_confirmation: false,
                })
            }
            None => {
                info!(role = %metadata.role, "Signed up; awaiting email confirmation");
                Ok(SignUpOutcome {
                    user_id,
                    needs_email_confirmation: true,
                })
            }
        }
    }

    /// Sign in with email and password.
    ///
    /// With `expected_role`, the session is only published once the user's
    /// profile is known to carry that role; on a mismatch the provider
    /// session is signed out again and the view never shows it.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        expected_role: Option<Role>,
    ) -> Result<(), SignInError> {
        self.inner.ensure_mounted()?;
        validate_credentials(email, password)?;

        let Some(expected) = expected_role else {
            let session = self
                .inner
                .provider
                .sign_in_with_password(email.trim(), password)
                .await?;
            info!(user_id = %session.user_id(), "Signed in");
            self.inner.dispatch(AuthEvent::SessionEstablished { session });
            return Ok(());
        };

        self.inner.dispatch(AuthEvent::SignInStarted);

        let session = match self
            .inner
            .provider
            .sign_in_with_password(email.trim(), password)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.inner
                    .dispatch(AuthEvent::SignInAbandoned { rejected_user: None });
                return Err(e.into());
            }
        };

        let profile = fetch_profile_with_retry(
            self.inner.profiles.as_ref(),
            session.user_id(),
            &self.inner.config.profile_retry,
        )
        .await;

        if let Some(actual) = profile.as_ref().map(|p| p.role) {
            if actual != expected {
                let mismatch = RoleMismatch { actual, expected };
                warn!(
                    user_id = %session.user_id(),
                    actual = %actual,
                    expected = %expected,
                    "Rejecting sign-in from another role's login page"
                );
                self.inner.dispatch(AuthEvent::SignInAbandoned {
                    rejected_user: Some(session.user_id().to_string()),
                });
                self.inner.revoke_provider_session().await;
                return Err(SignInError::RoleMismatch(mismatch));
            }
        }

        info!(user_id = %session.user_id(), expected = %expected, "Signed in");
        self.inner
            .dispatch(AuthEvent::SignInCommitted { session, profile });
        Ok(())
    }

    /// Start a social login and return the URL to navigate to.
    ///
    /// `signup_role` marks a sign-up page (the role is applied after the
    /// redirect); `expected_role` marks a role-specific login page.
    pub async fn sign_in_with_oauth(
        &self,
        signup_role: Option<&str>,
        expected_role: Option<Role>,
    ) -> AuthResult<String> {
        self.inner.ensure_mounted()?;
        let roles = &self.inner.roles;

        if let Some(requested) = signup_role {
            roles.prepare_signup_redirect(requested)?;
        }
        if let Some(expected) = expected_role {
            roles.prepare_login_redirect(expected)?;
        }

        let request = OAuthRedirectRequest {
            provider: self.inner.config.oauth_provider.clone(),
            redirect_to: self.inner.config.oauth_redirect_url(),
            query_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        };

        match self.inner.provider.begin_oauth_redirect(&request).await {
            Ok(url) => {
                info!(provider = %request.provider, "OAuth redirect started");
                Ok(url)
            }
            Err(e) => {
                warn!(provider = %request.provider, error = %e, "OAuth redirect failed to start");
                roles.abandon_redirect();
                Err(e)
            }
        }
    }

    /// Sign out. The view is cleared before the provider is contacted; if
    /// the provider call fails its stored keys are purged locally and the
    /// error is returned.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.inner.ensure_mounted()?;
        self.inner.sign_out_everywhere().await
    }

    /// Re-read the profile of the current user.
    pub async fn refresh_profile(&self) -> Option<RoleProfile> {
        let user_id = self.view().user_id()?.to_string();
        let profile = fetch_profile_with_retry(
            self.inner.profiles.as_ref(),
            &user_id,
            &self.inner.config.profile_retry,
        )
        .await;
        self.inner.dispatch(AuthEvent::ProfileLoaded {
            user_id,
            profile: profile.clone(),
        });
        profile
    }

    /// Update editable profile fields, then refresh the view.
    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthResult<()> {
        self.inner.ensure_mounted()?;
        let user_id = self
            .view()
            .user_id()
            .map(str::to_string)
            .ok_or(AuthError::NotLoggedIn)?;
        if update.is_empty() {
            return Ok(());
        }

        self.inner.profiles.update_profile(&user_id, &update).await?;
        self.refresh_profile().await;
        Ok(())
    }

    /// Read and clear the message left by a rejected OAuth login.
    pub fn take_oauth_error(&self) -> AuthResult<Option<String>> {
        self.inner.roles.take_error()
    }
}

impl Inner {
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn ensure_mounted(&self) -> AuthResult<()> {
        if self.is_torn_down() {
            Err(AuthError::Unmounted)
        } else {
            Ok(())
        }
    }

    fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        let mut timers = self.timers.lock();
        for slot in [TimerSlot::Safety, TimerSlot::CallbackWait] {
            if let Some(timer) = timers.slot(slot).take() {
                timer.abort();
            }
        }
        self.in_flight.discard_all();
    }

    fn dispatch(self: &Arc<Self>, event: AuthEvent) {
        if self.is_torn_down() {
            debug!("Ignoring auth event after unmount");
            return;
        }

        let outcome = {
            let mut core = self.core.lock();
            let outcome = core.apply(event);
            let view = core.view();
            self.view_tx.send_if_modified(|current| {
                if *current != *view {
                    *current = view.clone();
                    true
                } else {
                    false
                }
            });
            outcome
        };

        if outcome.forced {
            warn!(
                safety_timeout_ms = self.config.safety_timeout.as_millis() as u64,
                "Initial auth check did not settle in time; resolving loading"
            );
        }
        if outcome.loading_resolved {
            info!(authenticated = self.view_tx.borrow().is_authenticated(), "Auth state resolved");
        }

        for effect in outcome.effects {
            self.perform(effect);
        }
    }

    fn perform(self: &Arc<Self>, effect: Effect) {
        match effect {
            Effect::StartSafetyTimer => self.arm_timer(TimerSlot::Safety),
            Effect::CancelSafetyTimer => self.disarm_timer(TimerSlot::Safety),
            Effect::StartCallbackWait => self.arm_timer(TimerSlot::CallbackWait),
            Effect::CancelCallbackWait => self.disarm_timer(TimerSlot::CallbackWait),
            Effect::FetchProfile { user_id } => self.spawn_profile_fetch(user_id),
            Effect::ReconcileOAuthRole { user_id } => self.spawn_role_reconcile(user_id),
            Effect::DiscardInFlight => self.in_flight.discard_all(),
        }
    }

    fn arm_timer(self: &Arc<Self>, slot: TimerSlot) {
        let (delay, event) = match slot {
            TimerSlot::Safety => (self.config.safety_timeout, AuthEvent::SafetyTimerElapsed),
            TimerSlot::CallbackWait => (self.config.callback_wait, AuthEvent::CallbackWaitElapsed),
        };

        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(event);
            }
        });

        if let Some(previous) = self.timers.lock().slot(slot).replace(timer) {
            previous.abort();
        }
    }

    fn disarm_timer(&self, slot: TimerSlot) {
        if let Some(timer) = self.timers.lock().slot(slot).take() {
            timer.abort();
        }
    }

    fn spawn_profile_fetch(self: &Arc<Self>, user_id: String) {
        let Some(ticket) = self.in_flight.begin(&user_id, TaskKind::ProfileFetch) else {
            debug!(user_id = %user_id, "Profile fetch already in flight");
            return;
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let profile = fetch_profile_with_retry(
                inner.profiles.as_ref(),
                &user_id,
                &inner.config.profile_retry,
            )
            .await;

            if inner.in_flight.finish(&ticket) {
                inner.dispatch(AuthEvent::ProfileLoaded { user_id, profile });
            } else {
                debug!(user_id = %user_id, "Discarding stale profile fetch");
            }
        });
    }

    fn spawn_role_reconcile(self: &Arc<Self>, user_id: String) {
        let Some(ticket) = self.in_flight.begin(&user_id, TaskKind::RoleReconcile) else {
            return;
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.reconcile_roles(&ticket).await;
            inner.in_flight.finish(&ticket);
        });
    }

    async fn reconcile_roles(self: &Arc<Self>, ticket: &TaskTicket) {
        let user_id = ticket.user_id();

        match self
            .roles
            .reconcile_signup_role(
                user_id,
                self.provider.as_ref(),
                self.profiles.as_ref(),
                &self.config.profile_retry,
            )
            .await
        {
            Ok(SignupRoleOutcome::Applied(profile)) => {
                if self.in_flight.is_current(ticket) {
                    // A concurrent fetch may still return the pre-update row.
                    self.in_flight.invalidate(user_id, TaskKind::ProfileFetch);
                    self.dispatch(AuthEvent::ProfileLoaded {
                        user_id: user_id.to_string(),
                        profile: Some(profile),
                    });
                }
            }
            Ok(outcome) => debug!(user_id = %user_id, outcome = ?outcome, "Sign-up role reconciled"),
            Err(e) => warn!(
                user_id = %user_id,
                error = %e,
                "Sign-up role not applied; will retry on the next session event"
            ),
        }

        match self.roles.has_expected_role() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(error = %e, "Could not read expected login role");
                return;
            }
        }

        let profile = match self.profiles.fetch_profile(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Could not verify expected login role; will retry on the next session event"
                );
                return;
            }
        };
        if !self.in_flight.is_current(ticket) {
            return;
        }

        match self.roles.check_expected_role(profile.as_ref()) {
            Ok(ExpectedRoleOutcome::Mismatch(mismatch)) => {
                warn!(
                    user_id = %user_id,
                    actual = %mismatch.actual,
                    expected = %mismatch.expected,
                    "OAuth login came from another role's page; signing out"
                );
                if let Err(e) = self.sign_out_everywhere().await {
                    warn!(error = %e, "Sign-out after role mismatch failed");
                }
            }
            Ok(outcome) => debug!(user_id = %user_id, outcome = ?outcome, "Expected login role checked"),
            Err(e) => warn!(user_id = %user_id, error = %e, "Expected login role check failed"),
        }
    }

    async fn sign_out_everywhere(self: &Arc<Self>) -> AuthResult<()> {
        self.dispatch(AuthEvent::LocalSignOut);

        if let Err(e) = self.roles.clear_signup_role() {
            warn!(error = %e, "Failed to clear OAuth sign-up role");
        }

        match self.provider.sign_out().await {
            Ok(()) => {
                info!("Signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Provider sign-out failed; purging local session keys");
                self.purge_provider_keys();
                Err(e)
            }
        }
    }

    /// Sign the provider out without touching the view.
    async fn revoke_provider_session(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "Provider sign-out failed; purging local session keys");
            self.purge_provider_keys();
        }
    }

    fn purge_provider_keys(&self) {
        let prefix = self.provider.storage_key_prefix();
        if let Err(e) = self.roles.intents().purge_prefix(&prefix) {
            warn!(prefix = %prefix, error = %e, "Failed to purge provider storage keys");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
