//! Command handlers.
//!
//! Each command mounts a fresh orchestrator over the file-backed storage,
//! waits for the initial state, runs one action and prints the result.

use kyrant_auth::{AuthOrchestrator, AuthViewState, OrchestratorConfig, Role, SupabaseAuthClient};
use kyrant_config_and_utils::{Config, Paths};
use kyrant_storage::{DurableStorage, FileStorage, IntentStorage};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub type CommandResult = Result<(), Box<dyn Error>>;

const RECONCILE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Context {
    client: SupabaseAuthClient,
    storage: Arc<dyn DurableStorage>,
    config: OrchestratorConfig,
}

impl Context {
    pub fn open(paths: &Paths, config: &Config) -> Result<Self, Box<dyn Error>> {
        paths.ensure_dirs()?;
        let storage: Arc<dyn DurableStorage> = Arc::new(FileStorage::open(paths.storage_file())?);
        let client = SupabaseAuthClient::from_config(config, storage.clone())?;
        debug!(project_ref = %client.project_ref(), "Opened auth context");

        Ok(Self {
            client,
            storage,
            config: OrchestratorConfig::from(config),
        })
    }

    fn mount(&self, current_url: Option<&str>) -> AuthOrchestrator {
        let client = Arc::new(self.client.clone());
        AuthOrchestrator::mount(
            client.clone(),
            client,
            self.storage.clone(),
            self.config.clone(),
            current_url,
        )
    }

    async fn mount_loaded(&self) -> AuthOrchestrator {
        let orchestrator = self.mount(None);
        orchestrator.wait_until_loaded().await;
        orchestrator
    }
}

fn print_state(view: &AuthViewState) -> CommandResult {
    let state = json!({
        "authenticated": view.is_authenticated(),
        "user_id": view.user_id(),
        "email": view.identity.as_ref().and_then(|identity| identity.email.clone()),
        "role": view.role().map(|role| role.as_str()),
        "display_name": view.role_profile.as_ref().and_then(|profile| profile.display_name.clone()),
        "expires_at": view.session.as_ref().map(|session| session.expires_at.to_rfc3339()),
    });
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Print the view once the profile has been read as well.
async fn print_with_profile(orchestrator: &AuthOrchestrator) -> CommandResult {
    if orchestrator.view().is_authenticated() {
        orchestrator.refresh_profile().await;
    }
    print_state(&orchestrator.view())
}

pub async fn status(ctx: &Context) -> CommandResult {
    let orchestrator = ctx.mount_loaded().await;
    print_with_profile(&orchestrator).await?;
    orchestrator.unmount();
    Ok(())
}

pub async fn sign_in(
    ctx: &Context,
    email: &str,
    password: &str,
    expected_role: Option<Role>,
) -> CommandResult {
    let orchestrator = ctx.mount_loaded().await;

    if let Err(e) = orchestrator.sign_in(email, password, expected_role).await {
        orchestrator.unmount();
        return Err(e.user_message().into());
    }

    print_with_profile(&orchestrator).await?;
    orchestrator.unmount();
    Ok(())
}

pub async fn sign_up(
    ctx: &Context,
    email: &str,
    password: &str,
    role: &str,
    name: Option<&str>,
) -> CommandResult {
    let orchestrator = ctx.mount_loaded().await;
    let outcome = orchestrator.sign_up(email, password, role, name).await;
    orchestrator.unmount();
    let outcome = outcome?;

    if outcome.needs_email_confirmation {
        println!("Check your inbox for a confirmation link to finish signing up.");
    } else {
        println!("Account created and signed in.");
    }
    Ok(())
}

pub async fn sign_out(ctx: &Context) -> CommandResult {
    let orchestrator = ctx.mount_loaded().await;
    let result = orchestrator.sign_out().await;
    orchestrator.unmount();
    result?;
    println!("Signed out.");
    Ok(())
}

pub async fn oauth_start(
    ctx: &Context,
    signup_role: Option<&str>,
    expected_role: Option<Role>,
) -> CommandResult {
    let orchestrator = ctx.mount_loaded().await;
    let url = orchestrator
        .sign_in_with_oauth(signup_role, expected_role)
        .await;
    orchestrator.unmount();
    println!("{}", url?);
    Ok(())
}

/// Store the session from the callback, then let a fresh mount reconcile
/// the role intents written by `oauth-start`.
pub async fn oauth_complete(ctx: &Context, callback_url: &str) -> CommandResult {
    let session = ctx.client.complete_oauth_redirect(callback_url).await?;
    info!(user_id = %session.user_id(), "Callback accepted");

    let orchestrator = ctx.mount(Some(callback_url));
    orchestrator.wait_until_loaded().await;

    if !wait_for_intents(ctx, ctx.config.safety_timeout).await? {
        println!("The sign-up role will be applied on your next sign-in.");
    }

    if let Some(message) = orchestrator.take_oauth_error()? {
        orchestrator.unmount();
        return Err(message.into());
    }

    print_with_profile(&orchestrator).await?;
    orchestrator.unmount();
    Ok(())
}

pub async fn refresh_profile(ctx: &Context) -> CommandResult {
    let orchestrator = ctx.mount_loaded().await;
    let profile = orchestrator.refresh_profile().await;
    orchestrator.unmount();

    match profile {
        Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        None => println!("No profile available."),
    }
    Ok(())
}

/// Wait for background reconciliation to consume the role intents.
/// Returns `false` if any were still pending at the deadline.
async fn wait_for_intents(ctx: &Context, timeout: Duration) -> Result<bool, Box<dyn Error>> {
    let intents = IntentStorage::new(ctx.storage.clone());
    let deadline = Instant::now() + timeout;

    loop {
        let pending = intents.signup_role()?.is_some() || intents.expected_role()?.is_some();
        if !pending {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(RECONCILE_POLL_INTERVAL).await;
    }
}
