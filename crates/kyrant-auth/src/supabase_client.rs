//! Supabase adapters for the identity provider and profile store.
//!
//! Talks to GoTrue (`/auth/v1`) for identity and PostgREST (`/rest/v1`)
//! for the `profiles` table. The session is persisted in durable storage
//! under `sb-<project_ref>-auth-token`, the same key a browser client uses,
//! and auth events are fanned out to every subscriber.

use crate::callback::parse_callback_tokens;
use crate::error::{AuthError, AuthResult};
use crate::provider::{
    AuthEventReceiver, IdentityProvider, OAuthRedirectRequest, ProfileStore, ProviderEvent,
    SignUpMetadata, SignUpResponse, SignedUpUser,
};
use crate::roles::Role;
use crate::types::{Identity, ProfileUpdate, RoleProfile, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use kyrant_config_and_utils::Config;
use kyrant_storage::DurableStorage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

const PROFILE_COLUMNS: &str = "id,full_name,role,avatar_url,created_at,updated_at";

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Pull a human message out of a GoTrue or PostgREST error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Project ref from a hosted project URL (`https://<ref>.supabase.co`).
///
/// Other hosts fall back to the first host label.
pub fn project_ref_from_url(api_url: &Url) -> String {
    api_url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or("local")
        .to_string()
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    identities: Option<Vec<serde_json::Value>>,
}

impl UserResponse {
    fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            email_verified_session_present: self.email_confirmed_at.is_some(),
        }
    }

    /// A missing `identities` array counts as none, same as an empty one.
    fn identity_count(&self) -> usize {
        self.identities.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let issued_at = Utc::now();
        Session {
            identity: self.user.identity(),
            issued_at,
            expires_at: issued_at + Duration::seconds(self.expires_in),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
        }
    }
}

/// Sign-up answers with a full token response when email confirmation is
/// off, and with the bare user otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    WithSession(TokenResponse),
    UserOnly(UserResponse),
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    full_name: Option<String>,
    role: String,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_profile(self) -> RoleProfile {
        let role = Role::parse(&self.role).unwrap_or_else(|| {
            warn!(user_id = %self.id, value = %self.role, "Unknown profile role; using default");
            crate::roles::DEFAULT_PROVIDER_ROLE
        });
        RoleProfile {
            user_id: self.id,
            display_name: self.full_name,
            role,
            avatar_ref: self.avatar_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Serialize)]
struct ProfilePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    updated_at: String,
}

struct ClientInner {
    http_client: reqwest::Client,
    api_url: Url,
    publishable_key: String,
    project_ref: String,
    storage: Arc<dyn DurableStorage>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ProviderEvent>>>,
}

/// Supabase-backed identity provider and profile store. Cheap to clone.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    inner: Arc<ClientInner>,
}

impl SupabaseAuthClient {
    pub fn new(
        api_url: &str,
        publishable_key: impl Into<String>,
        storage: Arc<dyn DurableStorage>,
    ) -> AuthResult<Self> {
        let api_url = Url::parse(api_url)?;
        let project_ref = project_ref_from_url(&api_url);
        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client: reqwest::Client::new(),
                api_url,
                publishable_key: publishable_key.into(),
                project_ref,
                storage,
                subscribers: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn from_config(config: &Config, storage: Arc<dyn DurableStorage>) -> AuthResult<Self> {
        Self::new(
            &config.supabase_url,
            config.supabase_publishable_key.clone(),
            storage,
        )
    }

    pub fn project_ref(&self) -> &str {
        &self.inner.project_ref
    }

    fn session_key(&self) -> String {
        format!("{}auth-token", self.storage_key_prefix())
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.inner.api_url.as_str().trim_end_matches('/'),
            path
        )
    }

    fn auth_url(&self, path: &str) -> String {
        self.endpoint(&format!("/auth/v1/{}", path))
    }

    fn rest_url(&self, table: &str) -> String {
        self.endpoint(&format!("/rest/v1/{}", table))
    }

    // ==========================================
    // Persisted session
    // ==========================================

    fn load_session(&self) -> AuthResult<Option<Session>> {
        let key = self.session_key();
        let Some(raw) = self.inner.storage.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted session");
                self.inner.storage.delete(&key)?;
                Ok(None)
            }
        }
    }

    fn store_session(&self, session: Option<&Session>) -> AuthResult<()> {
        let key = self.session_key();
        match session {
            Some(session) => self
                .inner
                .storage
                .set(&key, &serde_json::to_string(session)?)?,
            None => {
                self.inner.storage.delete(&key)?;
            }
        }
        Ok(())
    }

    fn broadcast(&self, event: ProviderEvent) {
        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn accept_session(
        &self,
        session: Session,
        event: fn(Session) -> ProviderEvent,
    ) -> AuthResult<Session> {
        self.store_session(Some(&session))?;
        self.broadcast(event(session.clone()));
        Ok(session)
    }

    async fn failure(&self, response: reqwest::Response, context: &str) -> AuthError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(
            status = %status,
            body_summary = %summarize_response_body(&body),
            "{} failed",
            context
        );
        AuthError::Provider {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| format!("{} failed", context)),
        }
    }

    // ==========================================
    // Token endpoints
    // ==========================================

    /// Exchange the refresh token for a new session.
    pub async fn refresh_session(&self) -> AuthResult<Session> {
        let current = self.load_session()?.ok_or(AuthError::NotLoggedIn)?;
        let url = self.auth_url("token?grant_type=refresh_token");
        debug!(url = %url, "Refreshing session");

        let response = self
            .inner
            .http_client
            .post(&url)
            .header("apikey", &self.inner.publishable_key)
            .json(&json!({ "refresh_token": current.refresh_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body_summary = %summarize_response_body(&body), "Token refresh failed");
            if status.is_server_error() {
                return Err(AuthError::Provider {
                    status: status.as_u16(),
                    message: error_message(&body).unwrap_or_default(),
                });
            }
            return Err(AuthError::TokenRefresh(
                error_message(&body).unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        let data: TokenResponse = response.json().await?;
        let session = data.into_session();
        info!(user_id = %session.user_id(), "Session refreshed");
        self.accept_session(session, |s| ProviderEvent::token_refreshed(Some(s)))
    }

    /// Finish an implicit-flow OAuth redirect from the URL the browser landed on.
    pub async fn complete_oauth_redirect(&self, callback_url: &str) -> AuthResult<Session> {
        let tokens = parse_callback_tokens(callback_url)?;
        let user = self.fetch_user(&tokens.access_token).await?;

        let issued_at = Utc::now();
        let session = Session {
            identity: user.identity(),
            issued_at,
            expires_at: issued_at + Duration::seconds(tokens.expires_in),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        };
        info!(user_id = %session.user_id(), "OAuth redirect completed");
        self.accept_session(session, ProviderEvent::signed_in)
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<UserResponse> {
        let response = self
            .inner
            .http_client
            .get(self.auth_url("user"))
            .header("apikey", &self.inner.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::SessionInvalid(
                error_message(&body).unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        Ok(response.json().await?)
    }

    async fn bearer(&self) -> AuthResult<String> {
        self.get_current_session()
            .await?
            .map(|session| session.access_token)
            .ok_or(AuthError::NotLoggedIn)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    async fn get_current_session(&self) -> AuthResult<Option<Session>> {
        let Some(session) = self.load_session()? else {
            return Ok(None);
        };
        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user_id(), "Persisted session expired; refreshing");
        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                warn!(error = %e, "Dropping session that can no longer be refreshed");
                self.store_session(None)?;
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> AuthEventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();
        tokio::spawn(async move {
            let session = match client.get_current_session().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, "Could not restore session");
                    None
                }
            };
            // Registered under the lock so no event overtakes the initial one.
            let mut subscribers = client.inner.subscribers.lock();
            if tx.send(ProviderEvent::initial_state(session)).is_ok() {
                subscribers.push(tx);
            }
        });
        rx
    }

    async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> AuthResult<SignUpResponse> {
        let mut url = Url::parse(&self.auth_url("signup"))?;
        if let Some(redirect_to) = &metadata.email_redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }

        let response = self
            .inner
            .http_client
            .post(url)
            .header("apikey", &self.inner.publishable_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "Sign-up").await);
        }

        match response.json::<SignUpBody>().await? {
            SignUpBody::WithSession(data) => {
                let user = SignedUpUser {
                    id: data.user.id.clone(),
                    email: data.user.email.clone(),
                    identity_count: data.user.identity_count(),
                };
                let session = self.accept_session(data.into_session(), ProviderEvent::signed_in)?;
                Ok(SignUpResponse {
                    user: Some(user),
                    session: Some(session),
                })
            }
            SignUpBody::UserOnly(data) => Ok(SignUpResponse {
                user: Some(SignedUpUser {
                    identity_count: data.identity_count(),
                    id: data.id,
                    email: data.email,
                }),
                session: None,
            }),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let url = self.auth_url("token?grant_type=password");
        debug!(url = %url, "Attempting email/password sign-in");

        let response = self
            .inner
            .http_client
            .post(&url)
            .header("apikey", &self.inner.publishable_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::InvalidCredentials(
                error_message(&body).unwrap_or_else(|| "Invalid login credentials".to_string()),
            ));
        }
        if !status.is_success() {
            return Err(self.failure(response, "Sign-in").await);
        }

        let data: TokenResponse = response.json().await?;
        let session = data.into_session();
        info!(user_id = %session.user_id(), "Password sign-in accepted");
        self.accept_session(session, ProviderEvent::signed_in)
    }

    async fn begin_oauth_redirect(&self, request: &OAuthRedirectRequest) -> AuthResult<String> {
        let mut url = Url::parse(&self.auth_url("authorize"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("provider", &request.provider)
                .append_pair("redirect_to", &request.redirect_to);
            for (key, value) in &request.query_params {
                query.append_pair(key, value);
            }
        }
        Ok(url.into())
    }

    async fn sign_out(&self) -> AuthResult<()> {
        if let Some(session) = self.load_session()? {
            let response = self
                .inner
                .http_client
                .post(self.auth_url("logout"))
                .header("apikey", &self.inner.publishable_key)
                .header("Authorization", format!("Bearer {}", session.access_token))
                .send()
                .await?;

            let status = response.status();
            // 401/404: the session is already gone server-side.
            if !status.is_success() && status.as_u16() != 401 && status.as_u16() != 404 {
                return Err(self.failure(response, "Sign-out").await);
            }
        }

        self.store_session(None)?;
        self.broadcast(ProviderEvent::signed_out());
        Ok(())
    }

    async fn update_user_metadata(&self, fields: serde_json::Value) -> AuthResult<()> {
        let access_token = self.bearer().await?;
        let response = self
            .inner
            .http_client
            .put(self.auth_url("user"))
            .header("apikey", &self.inner.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&json!({ "data": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "User metadata update").await);
        }

        let user: UserResponse = response.json().await?;
        if let Some(mut session) = self.load_session()? {
            session.identity = user.identity();
            self.accept_session(session, |s| ProviderEvent::user_updated(Some(s)))?;
        }
        Ok(())
    }

    fn storage_key_prefix(&self) -> String {
        format!("sb-{}-", self.inner.project_ref)
    }
}

#[async_trait]
impl ProfileStore for SupabaseAuthClient {
    async fn fetch_profile(&self, user_id: &str) -> AuthResult<Option<RoleProfile>> {
        let access_token = self.bearer().await?;
        let url = format!(
            "{}?id=eq.{}&select={}&limit=1",
            self.rest_url("profiles"),
            user_id,
            PROFILE_COLUMNS
        );

        let response = self
            .inner
            .http_client
            .get(&url)
            .header("apikey", &self.inner.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "Profile fetch").await);
        }

        let rows: Vec<ProfileRow> = response.json().await?;
        Ok(rows.into_iter().next().map(ProfileRow::into_profile))
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> AuthResult<()> {
        let access_token = self.bearer().await?;
        let patch = ProfilePatch {
            full_name: update.display_name.as_deref(),
            avatar_url: update.avatar_ref.as_deref(),
            updated_at: Utc::now().to_rfc3339(),
        };

        let response = self
            .inner
            .http_client
            .patch(format!("{}?id=eq.{}", self.rest_url("profiles"), user_id))
            .header("apikey", &self.inner.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&patch)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "Profile update").await);
        }
        debug!(user_id = %user_id, "Profile updated");
        Ok(())
    }

    async fn update_profile_role(&self, user_id: &str, role: Role) -> AuthResult<()> {
        let access_token = self.bearer().await?;
        let response = self
            .inner
            .http_client
            .patch(format!("{}?id=eq.{}", self.rest_url("profiles"), user_id))
            .header("apikey", &self.inner.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .json(&json!({
                "role": role.as_str(),
                "updated_at": Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "Profile role update").await);
        }
        Ok(())
    }
}
