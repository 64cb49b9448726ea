//! HTTP listener that receives OAuth redirects.
//!
//! Requests awaiting a callback are keyed by their random `state` value, so
//! several users can authorize at once through the same listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use icalsync_domain::constants::{CALLBACK_PAGE_HTML, CALLBACK_PATH};
use icalsync_domain::{Result, SyncError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// What the authorization server sent back to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    /// Authorization code to exchange for tokens.
    pub code: Option<String>,
    /// Error reported instead of a code, e.g. `access_denied`.
    pub error: Option<String>,
}

/// Authorization requests waiting for their callback.
#[derive(Clone, Default)]
pub struct PendingAuthorizations {
    waiters: Arc<DashMap<String, oneshot::Sender<AuthorizationOutcome>>>,
}

impl PendingAuthorizations {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `state`; the receiver completes when its callback arrives.
    pub fn register(&self, state: &str) -> oneshot::Receiver<AuthorizationOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(state.to_string(), sender);
        receiver
    }

    /// Hand `outcome` to the request registered under `state`.
    ///
    /// Returns `false` when no such request is waiting.
    pub fn resolve(&self, state: &str, outcome: AuthorizationOutcome) -> bool {
        match self.waiters.remove(state) {
            Some((_, sender)) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Forget `state` without resolving it.
    pub fn cancel(&self, state: &str) {
        self.waiters.remove(state);
    }

    /// Whether `state` is still waiting.
    pub fn contains(&self, state: &str) -> bool {
        self.waiters.contains_key(state)
    }

    /// Number of waiting requests.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Router serving the callback path.
pub fn callback_router(pending: PendingAuthorizations) -> Router {
    Router::new().route(CALLBACK_PATH, get(handle_callback)).with_state(pending)
}

async fn handle_callback(
    State(pending): State<PendingAuthorizations>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let outcome = AuthorizationOutcome {
        code: params.get("code").cloned(),
        error: params.get("error").cloned(),
    };

    match params.get("state") {
        Some(state) if pending.resolve(state, outcome) => {
            debug!("authorization callback delivered");
        }
        Some(_) => error!("authorization callback for an unknown or expired request"),
        None => error!("authorization callback without state parameter"),
    }

    Html(CALLBACK_PAGE_HTML)
}

/// Background listener for [`callback_router`].
pub struct CallbackServer {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind `addr` and start serving callbacks into `pending`.
    pub async fn start(addr: SocketAddr, pending: PendingAuthorizations) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|err| {
            SyncError::Config(format!("failed to bind authorization listener on {addr}: {err}"))
        })?;
        let local_addr = listener.local_addr().map_err(|err| {
            SyncError::Internal(format!("failed to determine listener address: {err}"))
        })?;

        let app = callback_router(pending);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("authorization listener error: {}", err);
            }
        });

        info!(%local_addr, path = CALLBACK_PATH, "authorization listener started");
        Ok(Self { local_addr, shutdown_tx: Some(shutdown_tx), handle: Some(handle) })
    }

    /// Address actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting callbacks and wait for the listener to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    return Err(SyncError::Internal(format!(
                        "authorization listener panicked: {err}"
                    )));
                }
            }
        }

        Ok(())
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}
