//! Per-user OAuth authorization against Google.
//!
//! A stored credential is reused while it is still usable. Otherwise the
//! user is sent through the authorization-code flow: the authorization URL
//! is surfaced through an [`AuthorizationNotifier`], the coordinator waits
//! for the redirect to reach the [`CallbackServer`], exchanges the code and
//! persists the result.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use icalsync_core::CredentialStore;
use icalsync_domain::constants::CALENDAR_SCOPE;
use icalsync_domain::{AuthorizationConfig, Result, StoredCredential, SyncError};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::callback::{AuthorizationOutcome, CallbackServer, PendingAuthorizations};
use super::client::TokenRefresher;
use super::secrets::GoogleClientSecrets;
use crate::errors::InfraError;

type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Surfaces an authorization URL to whoever operates the service.
#[async_trait]
pub trait AuthorizationNotifier: Send + Sync {
    /// Called once per interactive attempt, before waiting for the callback.
    async fn authorization_required(&self, user_id: &str, user_email: &str, url: &Url);
}

/// Writes the authorization URL to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl AuthorizationNotifier for LogNotifier {
    async fn authorization_required(&self, user_id: &str, user_email: &str, url: &Url) {
        warn!(user_id, user_email, url = %url, "Please open the following address in your browser: {url}");
    }
}

/// Removes a pending request however the wait ends.
struct PendingGuard<'a> {
    pending: &'a PendingAuthorizations,
    state: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(self.state);
    }
}

/// Obtains, refreshes and forgets per-user Google credentials.
pub struct AuthorizationCoordinator {
    oauth: GoogleOAuthClient,
    http: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    pending: PendingAuthorizations,
    notifier: Arc<dyn AuthorizationNotifier>,
    timeout: Option<Duration>,
    listener: Option<CallbackServer>,
}

impl AuthorizationCoordinator {
    /// `http` must not follow redirects.
    pub fn new(
        secrets: &GoogleClientSecrets,
        redirect_uri: &str,
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
        pending: PendingAuthorizations,
    ) -> Result<Self> {
        let auth_url = AuthUrl::new(secrets.auth_uri.clone())
            .map_err(|err| SyncError::Config(format!("invalid authorization URI: {err}")))?;
        let token_url = TokenUrl::new(secrets.token_uri.clone())
            .map_err(|err| SyncError::Config(format!("invalid token URI: {err}")))?;
        let redirect_url = RedirectUrl::new(redirect_uri.to_string())
            .map_err(|err| SyncError::Config(format!("invalid redirect URI: {err}")))?;

        let mut oauth = BasicClient::new(ClientId::new(secrets.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url)
            .set_auth_type(AuthType::RequestBody);
        if let Some(secret) = &secrets.client_secret {
            oauth = oauth.set_client_secret(ClientSecret::new(secret.clone()));
        }

        Ok(Self {
            oauth,
            http,
            store,
            pending,
            notifier: Arc::new(LogNotifier),
            timeout: None,
            listener: None,
        })
    }

    /// Bind the callback listener from `config` and build a coordinator
    /// that owns it.
    pub async fn start(
        config: &AuthorizationConfig,
        secrets: &GoogleClientSecrets,
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let pending = PendingAuthorizations::new();
        let addr = SocketAddr::from(([0, 0, 0, 0], config.listening_port));
        let listener = CallbackServer::start(addr, pending.clone()).await?;

        let mut coordinator = Self::new(secrets, &config.redirect_uri(), store, http, pending)?;
        coordinator.timeout = config.timeout();
        coordinator.listener = Some(listener);
        Ok(coordinator)
    }

    /// Replace the default [`LogNotifier`].
    pub fn with_notifier(mut self, notifier: Arc<dyn AuthorizationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Bound the wait for the callback; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Address of the owned callback listener, if any.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(CallbackServer::local_addr)
    }

    /// Requests waiting for their callback.
    pub fn pending(&self) -> &PendingAuthorizations {
        &self.pending
    }

    /// Usable credential for the user, authorizing interactively if needed.
    ///
    /// Without a timeout this waits until the user completes the flow.
    #[instrument(skip(self))]
    pub async fn get_credential(&self, user_id: &str, user_email: &str) -> Result<StoredCredential> {
        match self.store.load(user_id).await {
            Ok(Some(credential)) if credential.is_reusable() => {
                debug!("reusing stored credential");
                return Ok(credential);
            }
            Ok(Some(_)) => info!("stored credential is about to expire and cannot be refreshed"),
            Ok(None) => {}
            // An unreadable credential would fail every run; drop it and re-authorize.
            Err(SyncError::Storage(message)) => {
                warn!(error = %message, "discarding unreadable stored credential");
                self.store.delete(user_id).await?;
            }
            Err(err) => return Err(err),
        }

        let code = self.await_authorization(user_id, user_email).await?;
        let token = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .request_async(&self.http)
            .await
            .map_err(|err| SyncError::from(InfraError::from(err)))?;

        let credential = credential_from_token(&token, None);
        self.store.save(user_id, &credential).await?;
        info!("authorization completed");
        Ok(credential)
    }

    /// Exchange the refresh token for a new access token and persist it.
    #[instrument(skip(self, credential))]
    pub async fn refresh(&self, user_id: &str, credential: &StoredCredential) -> Result<StoredCredential> {
        let refresh_token = credential.refresh_token.clone().ok_or_else(|| {
            SyncError::Authorization("credential has no refresh token".to_string())
        })?;

        let token = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&self.http)
            .await
            .map_err(|err| SyncError::from(InfraError::from(err)))?;

        let refreshed = credential_from_token(&token, Some(refresh_token));
        self.store.save(user_id, &refreshed).await?;
        debug!("access token refreshed");
        Ok(refreshed)
    }

    /// Drop the stored credential; the next request re-authorizes.
    pub async fn forget(&self, user_id: &str) -> Result<()> {
        self.store.delete(user_id).await?;
        info!(user_id, "stored credential removed");
        Ok(())
    }

    async fn await_authorization(&self, user_id: &str, user_email: &str) -> Result<String> {
        let state = Uuid::new_v4().to_string();
        let receiver = self.pending.register(&state);
        let _guard = PendingGuard { pending: &self.pending, state: &state };

        let (url, _) = self
            .oauth
            .authorize_url(|| CsrfToken::new(state.clone()))
            .add_scope(Scope::new(CALENDAR_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("login_hint", user_email)
            .url();

        self.notifier.authorization_required(user_id, user_email, &url).await;

        let received = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, receiver).await.map_err(|_| {
                SyncError::Authorization(format!(
                    "no authorization callback within {}s",
                    limit.as_secs()
                ))
            })?,
            None => receiver.await,
        };
        let AuthorizationOutcome { code, error } = received.map_err(|_| {
            SyncError::Internal("authorization request was dropped before completion".to_string())
        })?;

        if let Some(error) = error {
            return Err(SyncError::Authorization(format!("authorization denied: {error}")));
        }
        code.ok_or_else(|| {
            SyncError::Authorization("authorization callback carried no code".to_string())
        })
    }
}

#[async_trait]
impl TokenRefresher for AuthorizationCoordinator {
    async fn refresh(&self, user_id: &str, credential: &StoredCredential) -> Result<StoredCredential> {
        AuthorizationCoordinator::refresh(self, user_id, credential).await
    }
}

/// Token endpoints may omit the refresh token on refresh; keep the old one.
fn credential_from_token(token: &BasicTokenResponse, previous_refresh: Option<String>) -> StoredCredential {
    let expires_at = token
        .expires_in()
        .and_then(|lifetime| chrono::Duration::from_std(lifetime).ok())
        .map(|lifetime| Utc::now() + lifetime);
    let scope = token.scopes().map(|scopes| {
        scopes.iter().map(|scope| scope.as_str()).collect::<Vec<_>>().join(" ")
    });

    StoredCredential {
        access_token: token.access_token().secret().clone(),
        refresh_token: token.refresh_token().map(|t| t.secret().clone()).or(previous_refresh),
        token_type: "Bearer".to_string(),
        expires_at,
        scope,
    }
}
