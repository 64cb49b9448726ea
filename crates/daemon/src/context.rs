//! Application context: every long-lived component, built in dependency order

use std::net::SocketAddr;
use std::sync::Arc;

use icalsync_core::{CredentialStore, FeedSource, UserFlow};
use icalsync_domain::{AppConfig, Result};
use icalsync_infra::integrations::google::{
    AuthorizationCoordinator, GoogleCalendarConnector, GoogleClientSecrets,
};
use icalsync_infra::{
    DispatchTarget, Dispatcher, DispatcherConfig, FileCredentialStore, HttpClient, HttpFeedSource,
};
use tracing::info;

pub struct AppContext {
    pub config: AppConfig,
    pub coordinator: Arc<AuthorizationCoordinator>,
    pub flows: Vec<Arc<UserFlow>>,
    pub dispatcher: Dispatcher,
}

impl AppContext {
    /// Construct the context from a validated configuration.
    ///
    /// The callback listener is bound here, so a port conflict fails startup
    /// before any synchronization is scheduled.
    ///
    /// # Errors
    /// Returns `SyncError::Config` for unreadable client secrets, an
    /// unbindable listener or an invalid flow time zone.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(&config.authorization.storage_directory));
        let secrets = GoogleClientSecrets::load(&config.authorization.client_secrets_file)?;
        let http = HttpClient::new()?;
        let token_http = HttpClient::builder().follow_redirects(false).build()?;

        let coordinator = Arc::new(
            AuthorizationCoordinator::start(
                &config.authorization,
                &secrets,
                store,
                token_http.inner().clone(),
            )
            .await?,
        );
        if let Some(addr) = coordinator.listener_addr() {
            info!(%addr, "authorization callback listener ready");
        }

        let connector = Arc::new(GoogleCalendarConnector::new(coordinator.clone(), http.clone()));
        let feed_source: Arc<dyn FeedSource> = Arc::new(HttpFeedSource::new(http));

        let flows = config
            .users
            .iter()
            .map(|user| {
                UserFlow::from_config(
                    user,
                    config.flows_for(&user.id),
                    feed_source.clone(),
                    connector.clone(),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let targets = flows.iter().map(|flow| flow.clone() as Arc<dyn DispatchTarget>).collect();
        let dispatcher = Dispatcher::new(targets, DispatcherConfig::from_app_config(&config));

        info!(
            users = flows.len(),
            flows = config.flows.len(),
            workers = config.worker_pool_size(),
            delay_seconds = config.schedule.delay_seconds,
            "application context initialized"
        );

        Ok(Self { config, coordinator, flows, dispatcher })
    }

    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.coordinator.listener_addr()
    }

    /// Stop scheduling. In-flight synchronizations finish on their own.
    pub async fn shutdown(&mut self) {
        info!("shutdown called on AppContext");
        if self.dispatcher.is_running() {
            if let Err(err) = self.dispatcher.stop().await {
                tracing::warn!(error = %err, "dispatcher did not stop cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use icalsync_infra::config::parse_config;
    use tempfile::TempDir;

    use super::*;

    fn config(dir: &TempDir) -> AppConfig {
        let secrets = dir.path().join("client_secrets.json");
        std::fs::write(
            &secrets,
            r#"{"installed":{"client_id":"id.apps.googleusercontent.com","client_secret":"s"}}"#,
        )
        .unwrap();

        let contents = format!(
            r#"
[[users]]
id = "alice"
email = "alice@example.com"

[[users]]
id = "bob"
email = "bob@example.com"

[[flows]]
user_id = "alice"
ical_url = "https://example.com/alice.ics"
google_calendar_name = "Work"

[[flows]]
user_id = "alice"
ical_url = "https://example.com/sport.ics"
google_calendar_name = "Sport"

[[flows]]
user_id = "bob"
ical_url = "https://example.com/bob.ics"
google_calendar_name = "Bob"

[schedule]
delay_seconds = 60

[authorization]
listening_port = 0
redirect_url_base = "http://localhost:8085"
storage_directory = "{storage}"
client_secrets_file = "{secrets}"
"#,
            storage = dir.path().join("credentials").display(),
            secrets = secrets.display(),
        );
        parse_config(&contents, Path::new("icalsync.toml")).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn builds_one_flow_per_user() {
        let dir = TempDir::new().unwrap();
        let mut ctx = AppContext::build(config(&dir)).await.unwrap();

        let users: Vec<_> = ctx.flows.iter().map(|flow| flow.user_id().to_string()).collect();
        assert_eq!(users, vec!["alice", "bob"]);
        assert!(ctx.listener_addr().is_some());
        assert!(!ctx.dispatcher.is_running());

        ctx.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_client_secrets_fail_startup() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.authorization.client_secrets_file = dir.path().join("absent.json");

        assert!(AppContext::build(config).await.is_err());
    }
}
